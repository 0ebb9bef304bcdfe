//! 派发
//!
//! 启动一个异步任务，并阻塞当前线程直到它完成。
//! 异步任务在哪个线程上被唤醒，就在哪个线程上继续运行，直到下一个挂起点或完成。
//!

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

use crossbeam_channel::bounded;
use futures::{future::{BoxFuture, FutureExt},
              task::{ArcWake, waker_ref}};
use log::trace;
use parking_lot::Mutex;

use crate::error::{fatal, panic_message, CoroError, Result};
use super::Executor;

const IDLE: u8 = 0;         //挂起中，等待唤醒
const POLLING: u8 = 1;      //正在推动
const NOTIFIED: u8 = 2;     //推动中被唤醒，需要再推动一次
const COMPLETE: u8 = 3;     //已完成

// 派发的异步任务
struct SpawnTask {
    inner:  Mutex<Option<BoxFuture<'static, ()>>>,  //内部异步任务，只由推动者访问
    state:  AtomicU8,                               //推动状态
}

impl ArcWake for SpawnTask {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        //在唤醒者的线程上继续推动
        run_task(arc_self);
    }
}

// 推动异步任务，直到挂起或完成，已有其它推动者则通知它再推动一次
fn run_task(task: &Arc<SpawnTask>) {
    loop {
        match task.state.compare_exchange(IDLE, POLLING, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => break,
            Err(POLLING) => {
                if task
                    .state
                    .compare_exchange(POLLING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok() {
                    return;
                }
            },
            Err(_) => return,
        }
    }

    let waker = waker_ref(task);
    let mut context = Context::from_waker(&*waker);
    let mut inner = task.inner.lock();
    loop {
        let future = match inner.as_mut() {
            None => return,
            Some(future) => future,
        };

        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut context))) {
            Err(payload) => {
                fatal(CoroError::Fatal(format!("Spawned computation failed, reason: {}", panic_message(&*payload))));
            },
            Ok(Poll::Ready(())) => {
                *inner = None;
                task.state.store(COMPLETE, Ordering::Release);
                return;
            },
            Ok(Poll::Pending) => {
                if task
                    .state
                    .compare_exchange(POLLING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok() {
                    return;
                }

                //推动期间被唤醒，则立即再推动一次
                task.state.store(POLLING, Ordering::Release);
            },
        }
    }
}

/// 用指定的执行器启动异步任务，并阻塞当前线程直到异步任务完成，返回异步任务的值
///
/// 异步任务在完成前丢失了所有的继续，则返回Abandoned，异步任务内部失败则终止进程
pub fn spawn<E, F, Fut>(entry: F, executor: &Arc<E>) -> Result<Fut::Output>
    where E: Executor + ?Sized,
          F: FnOnce(Arc<E>) -> Fut,
          Fut: Future + Send + 'static,
          Fut::Output: Send + 'static {
    let executor = executor.clone();
    let future = match panic::catch_unwind(AssertUnwindSafe(move || entry(executor))) {
        Err(payload) => {
            fatal(CoroError::Fatal(format!("Spawn entry failed, reason: {}", panic_message(&*payload))));
        },
        Ok(future) => future,
    };

    let (sender, receiver) = bounded(1);
    let task = Arc::new(SpawnTask {
        inner: Mutex::new(Some(async move {
            //返回异步任务的值
            let output = future.await;
            let _ = sender.send(output);
        }.boxed())),
        state: AtomicU8::new(IDLE),
    });
    trace!("Spawn computation started");

    //在当前线程上推动到第一个挂起点，之后只由继续推动
    run_task(&task);
    drop(task);

    //同步阻塞等待异步任务返回
    match receiver.recv() {
        Err(_) => Err(CoroError::Abandoned("every continuation was dropped before completion")),
        Ok(output) => {
            trace!("Spawn computation completed");
            Ok(output)
        },
    }
}

#[cfg(test)]
use super::awaiter::{Awaiter, Complete};

#[cfg(test)]
fn double_on<E: Executor + ?Sized + 'static>(executor: &Arc<E>, value: usize) -> Awaiter<usize, E> {
    use super::ExecutorExt;

    Awaiter::new(move |complete: Complete<usize>, executor: &E| {
        executor.post(move || complete.complete(value * 2));
    }, executor)
}

// 首次推动返回Pending后发送通知的异步任务
#[cfg(test)]
struct NotifyOnPending<F: Future> {
    inner:  std::pin::Pin<Box<F>>,                      //内部异步任务
    notify: Option<crossbeam_channel::Sender<()>>,      //挂起通知
}

#[cfg(test)]
impl<F: Future> Future for NotifyOnPending<F> {
    type Output = F::Output;

    fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let poll = self.inner.as_mut().poll(cx);
        if poll.is_pending() {
            if let Some(notify) = self.notify.take() {
                let _ = notify.send(());
            }
        }
        poll
    }
}

#[test]
fn test_spawn_inline() {
    use super::InlineExecutor;

    let executor = Arc::new(InlineExecutor);
    let result = spawn(|executor| async move {
        let first = double_on(&executor, 1).await;
        let second = double_on(&executor, first).await;
        second + 1
    }, &executor);

    assert_eq!(result.unwrap(), 5);
}

#[test]
fn test_spawn_without_suspension() {
    use super::InlineExecutor;

    let result = spawn(|_| async { "ready" }, &Arc::new(InlineExecutor));
    assert_eq!(result.unwrap(), "ready");
}

#[test]
fn test_spawn_resumes_on_worker() {
    use std::thread;
    use super::ExecutorExt;
    use super::thread_pool::{ThreadPool, ThreadPoolBuilder};

    crate::tests::init_logger();
    let pool = Arc::new(ThreadPoolBuilder::new()
        .set_worker_size(4)
        .set_thread_name("spawn-test")
        .build()
        .unwrap());
    let caller = thread::current().id();
    let (pending_sender, pending_receiver) = bounded(1);

    let result = spawn(move |executor| NotifyOnPending {
        inner: Box::pin(async move {
            let mut value = 1;
            let mut resumed_on = Vec::new();
            let mut first_gate = Some(pending_receiver);
            for _ in 0..5 {
                let gate: Option<crossbeam_channel::Receiver<()>> = first_gate.take();
                value = Awaiter::new(move |complete: Complete<usize>, executor: &ThreadPool| {
                    executor.post(move || {
                        //调用者的首次推动已挂起，才允许完成
                        if let Some(gate) = gate {
                            let _ = gate.recv();
                        }
                        complete.complete(value * 2);
                    });
                }, &executor).await;

                //继续在调用完成回调的工作者线程上运行
                let current = thread::current();
                resumed_on.push((current.id(), current.name().map(|name| name.to_string())));
            }
            (value, resumed_on)
        }),
        notify: Some(pending_sender),
    }, &pool).unwrap();

    assert_eq!(result.0, 32);
    assert_eq!(result.1.len(), 5);
    for (id, name) in result.1 {
        assert_ne!(id, caller);
        assert!(name.unwrap().starts_with("spawn-test-"));
    }
    pool.join().unwrap();
}

#[test]
fn test_spawn_nested_computation() {
    use super::thread_pool::ThreadPool;

    async fn quadruple(executor: Arc<ThreadPool>, value: usize) -> usize {
        let doubled = double_on(&executor, value).await;
        double_on(&executor, doubled).await
    }

    let pool = Arc::new(ThreadPool::new(2).unwrap());
    let result = spawn(|executor| async move {
        let inner = quadruple(executor.clone(), 3).await;
        quadruple(executor, inner).await
    }, &pool);

    assert_eq!(result.unwrap(), 48);
    pool.join().unwrap();
}

#[test]
fn test_spawn_abandoned() {
    use super::InlineExecutor;

    let result = spawn(|executor| async move {
        Awaiter::new(|complete: Complete<usize>, _: &InlineExecutor| {
            drop(complete);
        }, &executor).await
    }, &Arc::new(InlineExecutor));

    assert!(matches!(result, Err(CoroError::Abandoned(_))));
}

#[test]
fn test_spawn_many_on_pool() {
    use std::sync::atomic::AtomicUsize;
    use super::thread_pool::ThreadPool;

    let pool = Arc::new(ThreadPool::new(8).unwrap());
    let counter = Arc::new(AtomicUsize::new(0));
    for round in 0..100 {
        let counter_copy = counter.clone();
        let result = spawn(move |executor| async move {
            let value = double_on(&executor, round).await;
            counter_copy.fetch_add(1, Ordering::SeqCst);
            value
        }, &pool);
        assert_eq!(result.unwrap(), round * 2);
    }

    assert_eq!(counter.load(Ordering::SeqCst), 100);
    pool.join().unwrap();
}

#[test]
fn test_spawn_panicking_computation_aborts() {
    use super::thread_pool::ThreadPool;

    crate::tests::assert_aborts("rt::spawn::test_spawn_panicking_computation_aborts", || {
        let pool = Arc::new(ThreadPool::new(1).unwrap());
        let _ = spawn(|executor| async move {
            let value = double_on(&executor, 1).await;
            if value == 2 {
                panic!("computation failed");
            }
            value
        }, &pool);
    });
}

#[test]
fn test_spawn_panicking_entry_aborts() {
    use super::InlineExecutor;

    crate::tests::assert_aborts("rt::spawn::test_spawn_panicking_entry_aborts", || {
        let _ = spawn(|_: Arc<InlineExecutor>| -> std::future::Ready<()> {
            panic!("entry failed")
        }, &Arc::new(InlineExecutor));
    });
}
