//! 协程运行时错误
//!

use std::any::Any;
use std::io;
use std::process;

use backtrace::Backtrace;
use log::error;
use thiserror::Error;

///
/// 协程运行时错误
///
#[derive(Debug, Error)]
pub enum CoroError {
    /// 生成器已完成，不再有当前值
    #[error("end of sequence")]
    EndOfSequence,

    /// 在不允许的状态下调用，例如重复的join或detach
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// 生成器或异步任务内部失败，只有Routine会把它作为值保留，其它情况会终止进程
    #[error("fatal: {0}")]
    Fatal(String),

    /// 派发的异步任务在完成前丢失了所有的继续
    #[error("computation abandoned: {0}")]
    Abandoned(&'static str),

    /// 工作者线程创建失败或配置无效
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// 协程运行时结果
pub type Result<T> = std::result::Result<T, CoroError>;

/// 记录内部失败和当前调用栈，并立即终止进程
pub fn fatal(err: CoroError) -> ! {
    error!("Coroutine runtime failed, reason: {}\n{:?}", err, Backtrace::new());
    process::abort()
}

// 从捕获的panic中提取失败原因
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[test]
fn test_panic_message() {
    use std::panic;

    let payload = panic::catch_unwind(|| panic!("static reason")).unwrap_err();
    assert_eq!(panic_message(&*payload), "static reason");

    let payload = panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
    assert_eq!(panic_message(&*payload), "formatted 42");

    let payload = panic::catch_unwind(|| panic::panic_any(7usize)).unwrap_err();
    assert_eq!(panic_message(&*payload), "unknown panic");
}

#[test]
fn test_error_display() {
    assert_eq!(CoroError::EndOfSequence.to_string(), "end of sequence");
    assert_eq!(CoroError::InvalidState("can't join").to_string(), "invalid state: can't join");

    let err: CoroError = io::Error::new(io::ErrorKind::InvalidInput, "zero workers").into();
    assert!(matches!(err, CoroError::Io(_)));
    assert_eq!(err.to_string(), "zero workers");
}
