//! 等待器
//!
//! 等待器把一个基于回调的异步操作转换为异步任务的一个挂起点。
//! 异步任务在挂起时把继续交给等待器，等待器构建完成回调，并把完成回调和执行器交给发起函数；
//! 完成回调被调用时保存结果，并在调用完成回调的线程上恢复异步任务。
//!

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

use log::warn;
use parking_lot::Mutex;

use crate::error::{CoroError, Result};
use super::Executor;

/// 发起函数，接收完成回调和执行器，并保证最终调用一次完成回调
pub type Initiator<T, E> = Box<dyn FnOnce(Complete<T>, &E) + Send + 'static>;

// 等待器和完成回调共享的状态
struct AwaitShared<T> {
    ready:  AtomicBool,             //结果是否已就绪
    slot:   Mutex<AwaitSlot<T>>,    //结果和继续
}

// 结果和继续
struct AwaitSlot<T> {
    result:         Option<T>,      //异步操作的结果
    continuation:   Option<Waker>,  //挂起的异步任务的继续
}

///
/// 完成回调
///
/// 完成回调只能调用一次，调用后保存结果并恢复挂起的异步任务
///
pub struct Complete<T> {
    shared: Option<Arc<AwaitShared<T>>>,
}

impl<T> Complete<T> {
    /// 保存异步操作的结果，并在当前线程上恢复挂起的异步任务
    pub fn complete(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            let continuation = {
                let mut slot = shared.slot.lock();
                slot.result = Some(value);
                shared.ready.store(true, Ordering::Release);
                slot.continuation.take()
            };

            //在锁外恢复，继续可能会立即推动异步任务
            if let Some(continuation) = continuation {
                continuation.wake();
            }
        }
    }
}

impl<T> Drop for Complete<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            //未完成就被释放，则释放继续，挂起的异步任务将不会被恢复
            warn!("Completion callback dropped without a result");
            let continuation = shared.slot.lock().continuation.take();
            drop(continuation);
        }
    }
}

///
/// 等待器
///
pub struct Awaiter<T, E: Executor + ?Sized = dyn Executor> {
    initiator:  Option<Initiator<T, E>>,    //发起函数，挂起时被取出
    executor:   Arc<E>,                     //发起函数使用的执行器
    shared:     Arc<AwaitShared<T>>,        //和完成回调共享的状态
}

impl<T, E: Executor + ?Sized> Awaiter<T, E> {
    /// 用指定的发起函数和执行器构建等待器
    pub fn new<F>(initiator: F, executor: &Arc<E>) -> Self
        where F: FnOnce(Complete<T>, &E) + Send + 'static {
        Awaiter {
            initiator: Some(Box::new(initiator)),
            executor: executor.clone(),
            shared: Arc::new(AwaitShared {
                ready: AtomicBool::new(false),
                slot: Mutex::new(AwaitSlot {
                    result: None,
                    continuation: None,
                }),
            }),
        }
    }

    /// 获取发起函数使用的执行器
    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// 判断结果是否已就绪
    #[inline]
    pub fn ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// 挂起，注册指定的继续，并在首次挂起时调用发起函数
    ///
    /// 再次挂起只会替换已注册的继续，结果已就绪则立即恢复指定的继续
    pub fn suspend(&mut self, continuation: Waker) {
        {
            let mut slot = self.shared.slot.lock();
            if self.shared.ready.load(Ordering::Acquire) {
                drop(slot);
                continuation.wake();
                return;
            }
            slot.continuation = Some(continuation);
        }

        if let Some(initiator) = self.initiator.take() {
            let complete = Complete {
                shared: Some(self.shared.clone()),
            };
            initiator(complete, &*self.executor);
        }
    }

    /// 恢复，并获取异步操作的结果
    pub fn resume(&mut self) -> Result<T> {
        if !self.ready() {
            return Err(CoroError::InvalidState("awaiter is not ready"));
        }

        self.shared
            .slot
            .lock()
            .result
            .take()
            .ok_or(CoroError::InvalidState("awaiter result already consumed"))
    }
}

impl<T, E: Executor + ?Sized> Future for Awaiter<T, E> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let awaiter = self.get_mut();
        if !awaiter.ready() {
            awaiter.suspend(cx.waker().clone());
            if !awaiter.ready() {
                //等待完成回调恢复
                return Poll::Pending;
            }
        }

        match awaiter.resume() {
            Ok(value) => Poll::Ready(value),
            Err(_) => panic!("`Awaiter` polled after completion"),
        }
    }
}

#[cfg(test)]
struct CountWaker(std::sync::atomic::AtomicUsize);

#[cfg(test)]
impl futures::task::ArcWake for CountWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_awaiter_sync_completion() {
    use std::sync::atomic::AtomicUsize;
    use crate::rt::{ExecutorExt, InlineExecutor};

    let executor = Arc::new(InlineExecutor);
    let mut awaiter = Awaiter::new(|complete: Complete<usize>, executor: &InlineExecutor| {
        executor.post(move || complete.complete(42));
    }, &executor);
    assert!(!awaiter.ready());
    assert!(matches!(awaiter.resume(), Err(CoroError::InvalidState(_))));

    let counter = Arc::new(CountWaker(AtomicUsize::new(0)));
    awaiter.suspend(futures::task::waker(counter.clone()));

    //完成回调已在挂起时同步调用，并恢复了继续
    assert!(awaiter.ready());
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert_eq!(awaiter.resume().unwrap(), 42);
    assert!(matches!(awaiter.resume(), Err(CoroError::InvalidState(_))));
}

#[test]
fn test_awaiter_initiator_runs_once() {
    use std::sync::atomic::AtomicUsize;
    use futures::task::noop_waker;
    use crate::rt::InlineExecutor;

    let started = Arc::new(AtomicUsize::new(0));
    let started_copy = started.clone();
    let slot = Arc::new(Mutex::new(None));
    let slot_copy = slot.clone();
    let mut awaiter = Awaiter::new(move |complete: Complete<&'static str>, _: &InlineExecutor| {
        started_copy.fetch_add(1, Ordering::SeqCst);
        *slot_copy.lock() = Some(complete);
    }, &Arc::new(InlineExecutor));

    awaiter.suspend(noop_waker());
    awaiter.suspend(noop_waker());
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert!(!awaiter.ready());

    //替换后的继续被恢复
    let counter = Arc::new(CountWaker(AtomicUsize::new(0)));
    awaiter.suspend(futures::task::waker(counter.clone()));
    let complete = slot.lock().take().unwrap();
    complete.complete("done");
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert_eq!(awaiter.resume().unwrap(), "done");
}

#[test]
fn test_awaiter_dropped_callback() {
    use std::sync::atomic::AtomicUsize;
    use crate::rt::InlineExecutor;

    let mut awaiter = Awaiter::new(|complete: Complete<usize>, _: &InlineExecutor| {
        drop(complete);
    }, &Arc::new(InlineExecutor));

    let counter = Arc::new(CountWaker(AtomicUsize::new(0)));
    awaiter.suspend(futures::task::waker(counter.clone()));

    //继续已被释放，且不会被恢复
    assert!(!awaiter.ready());
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    assert_eq!(Arc::strong_count(&counter), 1);
}

#[test]
fn test_awaiter_on_thread_pool() {
    use futures::executor::block_on;
    use crate::rt::{ExecutorExt, thread_pool::ThreadPool};

    let pool = Arc::new(ThreadPool::new(2).unwrap());
    let executor: Arc<dyn Executor> = pool.clone();

    let awaiter = Awaiter::<String, dyn Executor>::new(|complete, executor| {
        executor.post(move || {
            complete.complete(format!("from {:?}", std::thread::current().name()));
        });
    }, &executor);
    let value = block_on(awaiter);
    assert!(value.starts_with("from Some(\"pi-coro-worker-"));

    let unit = Awaiter::<(), dyn Executor>::new(|complete, executor| {
        executor.post(move || complete.complete(()));
    }, &executor);
    block_on(unit);

    drop(executor);
    pool.join().unwrap();
}
