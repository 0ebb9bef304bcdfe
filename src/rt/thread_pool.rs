//! 线程池执行器
//!

use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::{fatal, CoroError, Result};
use super::{alloc_rt_uid, run_work, Executor, Work};

/// 默认的工作者数量
pub const DEFAULT_WORKER_SIZE: usize = 12;

/// 默认的工作者线程名前缀
pub const DEFAULT_THREAD_NAME: &str = "pi-coro-worker";

///
/// 线程池的生命周期，只能从Joinable单向转换
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Joinable,   //可以join或detach
    Joined,     //已join，所有工作者已退出
    Detached,   //已detach，不再持有工作者
}

// 任务队列
struct TaskQueue {
    tasks:      VecDeque<Work>, //待执行的任务
    running:    bool,           //是否继续等待新任务
}

// 工作者共享的状态
struct PoolShared {
    queue:      Mutex<TaskQueue>,   //任务队列
    condvar:    Condvar,            //任务队列的唤醒器
}

impl PoolShared {
    // 请求所有工作者在执行完队列中的任务后退出
    fn stop(&self) {
        let mut queue = self.queue.lock();
        queue.running = false;
        self.condvar.notify_all();
    }
}

///
/// 线程池构建器
///
pub struct ThreadPoolBuilder {
    worker_size:        usize,          //工作者数量
    thread_name:        String,         //工作者线程名前缀
    thread_stack_size:  Option<usize>,  //工作者线程栈大小，空表示使用系统默认值
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        ThreadPoolBuilder {
            worker_size: DEFAULT_WORKER_SIZE,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            thread_stack_size: None,
        }
    }
}

impl ThreadPoolBuilder {
    /// 构建默认的线程池构建器
    pub fn new() -> Self {
        ThreadPoolBuilder::default()
    }

    /// 构建每个逻辑核一个工作者的线程池构建器
    pub fn per_cpu() -> Self {
        ThreadPoolBuilder::default().set_worker_size(num_cpus::get())
    }

    /// 设置工作者数量
    pub fn set_worker_size(mut self, worker_size: usize) -> Self {
        self.worker_size = worker_size;
        self
    }

    /// 设置工作者线程名前缀
    pub fn set_thread_name(mut self, thread_name: &str) -> Self {
        self.thread_name = thread_name.to_string();
        self
    }

    /// 设置工作者线程栈大小
    pub fn set_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = Some(thread_stack_size);
        self
    }

    /// 构建线程池，并启动所有工作者
    pub fn build(self) -> Result<ThreadPool> {
        if self.worker_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Thread pool requires at least one worker").into());
        }

        let id = alloc_rt_uid();
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(TaskQueue {
                tasks: VecDeque::new(),
                running: true,
            }),
            condvar: Condvar::new(),
        });

        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(self.worker_size);
        for index in 0..self.worker_size {
            let mut builder = thread::Builder::new()
                .name(format!("{}-{}-{}", self.thread_name, id, index));
            if let Some(size) = self.thread_stack_size {
                builder = builder.stack_size(size);
            }

            let shared_copy = shared.clone();
            match builder.spawn(move || worker_loop(shared_copy)) {
                Err(e) => {
                    //已启动的工作者需要退出
                    shared.stop();
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e.into());
                },
                Ok(worker) => workers.push(worker),
            }
        }
        debug!("Thread pool started, id: {}, workers: {}", id, self.worker_size);

        Ok(ThreadPool {
            id,
            worker_size: self.worker_size,
            shared,
            workers: Mutex::new(workers),
            lifecycle: Mutex::new(Lifecycle::Joinable),
        })
    }
}

///
/// 线程池执行器
///
pub struct ThreadPool {
    id:             usize,                      //线程池唯一id
    worker_size:    usize,                      //工作者数量
    shared:         Arc<PoolShared>,            //工作者共享的状态
    workers:        Mutex<Vec<JoinHandle<()>>>, //工作者
    lifecycle:      Mutex<Lifecycle>,           //生命周期
}

impl Executor for ThreadPool {
    /// 把任务加入队列尾部，并唤醒一个工作者
    fn schedule(&self, work: Work) {
        let mut queue = self.shared.queue.lock();
        if !queue.running {
            //工作者已退出或正在退出，则在当前线程上执行
            drop(queue);
            warn!("Thread pool stopped, run work inline, id: {}", self.id);
            return run_work(work);
        }

        queue.tasks.push_back(work);
        trace!("Thread pool scheduled work, id: {}, len: {}", self.id, queue.tasks.len());
        self.shared.condvar.notify_one();
    }
}

impl ThreadPool {
    /// 用指定数量的工作者构建线程池
    pub fn new(worker_size: usize) -> Result<Self> {
        ThreadPoolBuilder::new()
            .set_worker_size(worker_size)
            .build()
    }

    /// 获取线程池唯一id
    pub fn id(&self) -> usize {
        self.id
    }

    /// 获取工作者数量
    pub fn worker_size(&self) -> usize {
        self.worker_size
    }

    /// 获取队列中待执行的任务数量
    pub fn len(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }

    /// 获取当前生命周期
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// 判断是否可以join或detach
    pub fn is_joinable(&self) -> bool {
        self.lifecycle() == Lifecycle::Joinable
    }

    /// 请求所有工作者退出，并等待它们执行完队列中的所有任务
    pub fn join(&self) -> Result<()> {
        let workers = {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != Lifecycle::Joinable {
                return Err(CoroError::InvalidState("thread pool can't join"));
            }

            let mut workers = self.workers.lock();
            let current = thread::current().id();
            if workers.iter().any(|worker| worker.thread().id() == current) {
                //工作者不能等待自己退出
                return Err(CoroError::InvalidState("thread pool can't join from its own worker"));
            }

            *lifecycle = Lifecycle::Joined;
            mem::take(&mut *workers)
        };

        self.shared.stop();
        for worker in workers {
            if worker.join().is_err() {
                warn!("Thread pool worker exited abnormally, id: {}", self.id);
            }
        }
        debug!("Thread pool joined, id: {}", self.id);

        Ok(())
    }

    /// 释放所有工作者，不等待它们退出
    pub fn detach(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Joinable {
            return Err(CoroError::InvalidState("thread pool can't detach"));
        }

        *lifecycle = Lifecycle::Detached;
        self.workers.lock().clear();
        debug!("Thread pool detached, id: {}", self.id);

        Ok(())
    }
}

impl Default for ThreadPool {
    /// 用默认数量的工作者构建线程池，工作者无法启动则终止进程
    fn default() -> Self {
        match ThreadPoolBuilder::new().build() {
            Err(e) => fatal(e),
            Ok(pool) => pool,
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let lifecycle = *self.lifecycle.get_mut();
        match lifecycle {
            Lifecycle::Joined => (),
            Lifecycle::Detached => self.shared.stop(),
            Lifecycle::Joinable => {
                //请求退出后释放工作者，不阻塞当前线程
                self.shared.stop();
                *self.lifecycle.get_mut() = Lifecycle::Detached;
                self.workers.get_mut().clear();
                debug!("Thread pool dropped while joinable, id: {}", self.id);
            },
        }
    }
}

// 工作者循环，在队列为空且请求退出时结束
fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let work = {
            let mut queue = shared.queue.lock();
            while queue.tasks.is_empty() && queue.running {
                shared.condvar.wait(&mut queue);
            }

            match queue.tasks.pop_front() {
                None => break,
                Some(work) => work,
            }
        };

        //在锁外执行任务
        run_work(work);
    }
}

#[cfg(test)]
fn counting_work(counter: &Arc<std::sync::atomic::AtomicUsize>) -> impl FnOnce() + Send + 'static {
    use std::sync::atomic::Ordering;

    let counter = counter.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_thread_pool_join() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use rand::Rng;
    use crate::rt::ExecutorExt;

    crate::tests::init_logger();
    let mut rng = rand::thread_rng();
    for _ in 0..8 {
        let worker_size = rng.gen_range(1, 9);
        let work_count = rng.gen_range(0, 500);

        let pool = ThreadPool::new(worker_size).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..work_count {
            pool.post(counting_work(&counter));
        }

        pool.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), work_count);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.lifecycle(), Lifecycle::Joined);
        assert!(matches!(pool.join(), Err(CoroError::InvalidState(_))));
    }
}

#[test]
fn test_thread_pool_join_detach_exclusive() {
    let pool = ThreadPool::new(2).unwrap();
    assert!(pool.is_joinable());
    pool.detach().unwrap();
    assert!(!pool.is_joinable());
    assert!(matches!(pool.join(), Err(CoroError::InvalidState(_))));
    assert!(matches!(pool.detach(), Err(CoroError::InvalidState(_))));

    let pool = ThreadPool::new(2).unwrap();
    pool.join().unwrap();
    assert!(matches!(pool.detach(), Err(CoroError::InvalidState(_))));
    assert_eq!(pool.lifecycle(), Lifecycle::Joined);
}

#[test]
fn test_thread_pool_fifo() {
    use crate::rt::ExecutorExt;

    let pool = ThreadPool::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 0..100 {
        let order_copy = order.clone();
        pool.post(move || order_copy.lock().push(index));
    }
    pool.join().unwrap();

    assert_eq!(*order.lock(), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_thread_pool_runs_outside_lock() {
    use std::time::Duration;
    use crossbeam_channel::bounded;
    use crate::rt::ExecutorExt;

    let pool = ThreadPool::new(2).unwrap();
    let (sender, receiver) = bounded(1);
    let (done_sender, done_receiver) = bounded(2);

    //第一个任务等待第二个任务的消息，任务在锁内执行则会死锁
    let done_copy = done_sender.clone();
    pool.post(move || {
        let value: usize = receiver.recv_timeout(Duration::from_secs(10)).unwrap();
        done_copy.send(value).unwrap();
    });
    pool.post(move || {
        sender.send(7).unwrap();
        done_sender.send(0).unwrap();
    });

    pool.join().unwrap();
    let mut values: Vec<usize> = done_receiver.try_iter().collect();
    values.sort();
    assert_eq!(values, vec![0, 7]);
}

#[test]
fn test_thread_pool_join_from_worker() {
    use std::time::Duration;
    use crossbeam_channel::bounded;
    use crate::rt::ExecutorExt;

    let pool = Arc::new(ThreadPool::new(2).unwrap());
    let (sender, receiver) = bounded(1);
    let pool_copy = pool.clone();
    pool.post(move || {
        sender.send(pool_copy.join()).unwrap();
    });

    let result = receiver.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(matches!(result, Err(CoroError::InvalidState(_))));
    assert!(pool.is_joinable());
    pool.join().unwrap();
}

#[test]
fn test_thread_pool_drop_drains_queue() {
    use std::time::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crossbeam_channel::bounded;
    use crate::rt::ExecutorExt;

    let pool = ThreadPool::new(1).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = bounded(1);
    for _ in 0..10 {
        pool.post(counting_work(&counter));
    }
    pool.post(move || {
        sender.send(()).unwrap();
    });
    drop(pool);

    //释放时不阻塞，但已派发的任务仍会被执行
    receiver.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn test_thread_pool_schedule_after_join() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::rt::ExecutorExt;

    let pool = ThreadPool::new(3).unwrap();
    pool.join().unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    pool.post(counting_work(&counter));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_thread_pool_builder() {
    use std::time::Duration;
    use crossbeam_channel::bounded;
    use crate::rt::ExecutorExt;

    assert!(matches!(ThreadPool::new(0), Err(CoroError::Io(_))));
    assert_eq!(ThreadPoolBuilder::per_cpu().build().unwrap().worker_size(), num_cpus::get());

    let pool = ThreadPoolBuilder::new()
        .set_worker_size(1)
        .set_thread_name("test-pool")
        .set_thread_stack_size(256 * 1024)
        .build()
        .unwrap();
    assert_eq!(pool.worker_size(), 1);

    let (sender, receiver) = bounded(1);
    pool.post(move || {
        sender.send(thread::current().name().map(|name| name.to_string())).unwrap();
    });
    let name = receiver.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
    assert_eq!(name, format!("test-pool-{}-0", pool.id()));
    pool.join().unwrap();
}

#[test]
fn test_thread_pool_default() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::rt::ExecutorExt;

    let pool = ThreadPool::default();
    assert_eq!(pool.worker_size(), DEFAULT_WORKER_SIZE);
    assert!(pool.is_joinable());

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..DEFAULT_WORKER_SIZE * 2 {
        pool.post(counting_work(&counter));
    }
    pool.join().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), DEFAULT_WORKER_SIZE * 2);
}
