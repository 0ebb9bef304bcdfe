//! 执行器和异步运行时
//!
//! - [执行器]: 接受一个延迟执行的任务，并保证它最终会被执行，默认在调用者上同步执行
//! - [线程池执行器]: 由固定数量的工作者线程共享一个先进先出的任务队列
//! - [等待器]: 把基于回调的异步操作转换为异步任务的挂起和恢复
//! - [派发]: 启动一个异步任务，并阻塞当前线程直到它完成
//!
//! [执行器]: trait.Executor.html
//! [线程池执行器]: thread_pool/struct.ThreadPool.html
//! [等待器]: awaiter/struct.Awaiter.html
//! [派发]: spawn/fn.spawn.html

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{fatal, panic_message, CoroError};

pub mod awaiter;
pub mod spawn;
pub mod thread_pool;

/// 延迟执行的任务
pub type Work = Box<dyn FnOnce() + Send + 'static>;

///
/// 执行器
///
pub trait Executor: Send + Sync {
    /// 调度一个任务，并保证它最终会被执行，默认在当前线程上立即执行
    fn schedule(&self, work: Work) {
        run_work(work);
    }
}

///
/// 执行器扩展
///
pub trait ExecutorExt: Executor {
    /// 调度一个闭包
    #[inline]
    fn post<F>(&self, func: F)
        where F: FnOnce() + Send + 'static {
        self.schedule(Box::new(func));
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

///
/// 在调用者线程上同步执行任务的执行器
///
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {}

// 运行时唯一id分配器
static RT_UID_ALLOCATOR: AtomicUsize = AtomicUsize::new(0);

/// 分配运行时唯一id
pub fn alloc_rt_uid() -> usize {
    RT_UID_ALLOCATOR.fetch_add(1, Ordering::Relaxed)
}

// 执行任务，任务内部失败则终止进程
#[inline]
pub(crate) fn run_work(work: Work) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        fatal(CoroError::Fatal(format!("Run work failed, reason: {}", panic_message(&*payload))));
    }
}

#[test]
fn test_inline_executor() {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    let executor = InlineExecutor;
    let flag = Arc::new(AtomicBool::new(false));
    let flag_copy = flag.clone();
    executor.post(move || {
        flag_copy.store(true, Ordering::SeqCst);
    });

    //在返回前已执行
    assert!(flag.load(Ordering::SeqCst));
}

#[test]
fn test_inline_executor_as_trait_object() {
    use std::sync::Arc;
    use parking_lot::Mutex;

    let executor: Arc<dyn Executor> = Arc::new(InlineExecutor);
    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 0..3 {
        let order_copy = order.clone();
        executor.post(move || order_copy.lock().push(index));
    }

    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[test]
fn test_alloc_rt_uid() {
    let first = alloc_rt_uid();
    let second = alloc_rt_uid();
    assert!(second > first);
}

#[test]
fn test_panicking_work_aborts() {
    crate::tests::assert_aborts("rt::test_panicking_work_aborts", || {
        InlineExecutor.post(|| panic!("work failed"));
    });
}
