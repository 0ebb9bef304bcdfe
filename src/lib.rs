//! # 最小化的协程运行时，用于为外部提供生成器、执行器和基于回调的异步等待
//!
//! ## 主要特征
//! - [生成器]在构建时立即运行到第一个产出点，可以作为迭代器使用，
//! - [序列]和[例程]是生成器的两种变体，[区间]是常用的整数序列，
//! - 抽象的[执行器]接口，默认在调用者线程上同步执行，
//! - 固定工作者数量的[线程池执行器]，
//! - [等待器]可以把基于回调的异步操作转换为异步任务的挂起点，由[派发]启动并阻塞等待异步任务完成。
//!
//! [生成器]: generator/struct.Generator.html
//! [序列]: generator/struct.Sequence.html
//! [例程]: generator/struct.Routine.html
//! [区间]: generator/fn.range.html
//! [执行器]: rt/trait.Executor.html
//! [线程池执行器]: rt/thread_pool/struct.ThreadPool.html
//! [等待器]: rt/awaiter/struct.Awaiter.html
//! [派发]: rt/spawn/fn.spawn.html
//!
//! # Examples
//!
//! 生成器:
//! ```
//! use pi_coro::prelude::{from_fn, from_stream, range, stream, Generator, GeneratorState, Sequence};
//!
//! let evens: Vec<i64> = range(0, 10, 2).collect();
//! assert_eq!(evens, vec![0, 2, 4, 6, 8]);
//!
//! let mut count = 0;
//! let mut counter = Generator::new(from_fn(move || {
//!     count += 1;
//!     if count > 3 {
//!         GeneratorState::Complete(0)
//!     } else {
//!         GeneratorState::Yielded(count)
//!     }
//! }));
//! assert_eq!(*counter.current(), 1);
//! assert_eq!((&mut counter).collect::<Vec<_>>(), vec![1, 2, 3]);
//! assert_eq!(counter.completion(), Some(&0));
//!
//! let words = Sequence::new(from_stream(stream! {
//!     for word in vec!["123", "456"] {
//!         yield word;
//!     }
//! }));
//! assert_eq!(words.collect::<Vec<_>>(), vec!["123", "456"]);
//! ```
//!
//! 线程池执行器:
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use pi_coro::prelude::{ExecutorExt, ThreadPoolBuilder};
//!
//! let pool = ThreadPoolBuilder::new()
//!     .set_worker_size(4)
//!     .set_thread_name("demo")
//!     .build()
//!     .unwrap();
//! let counter = Arc::new(AtomicUsize::new(0));
//! for _ in 0..10 {
//!     let counter_copy = counter.clone();
//!     pool.post(move || {
//!         counter_copy.fetch_add(1, Ordering::SeqCst);
//!     });
//! }
//! pool.join().unwrap();
//! assert_eq!(counter.load(Ordering::SeqCst), 10);
//! ```
//!
//! 等待器和派发:
//! ```
//! use std::sync::Arc;
//! use pi_coro::prelude::{spawn, Awaiter, Complete, ExecutorExt, ThreadPool};
//!
//! let pool = Arc::new(ThreadPool::new(2).unwrap());
//! let output = spawn(|executor| async move {
//!     Awaiter::new(|complete: Complete<usize>, executor: &ThreadPool| {
//!         executor.post(move || complete.complete(42));
//!     }, &executor).await
//! }, &pool);
//! assert_eq!(output.unwrap(), 42);
//! pool.join().unwrap();
//! ```

pub mod error;
pub mod generator;
pub mod prelude;
pub mod rt;

mod tests;

pub use error::{fatal, CoroError, Result};
