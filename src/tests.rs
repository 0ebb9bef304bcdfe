#![cfg(test)]

use std::env;
use std::io::{self, BufRead, Cursor};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::generator::{range, GeneratorState, Sequence};
use crate::rt::{Executor, ExecutorExt, InlineExecutor,
                awaiter::{Awaiter, Complete},
                spawn::spawn,
                thread_pool::ThreadPool};

// 初始化测试日志，可以重复调用
pub(crate) fn init_logger() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

// 标记当前进程是执行终止用例的子进程
const ABORT_CASE_ENV: &str = "PI_CORO_ABORT_CASE";

// 在子进程中单独运行指定的用例，并断言子进程异常退出
pub(crate) fn assert_aborts<F: FnOnce()>(case: &str, body: F) {
    if env::var(ABORT_CASE_ENV).ok().as_deref() == Some(case) {
        body();
        return;
    }

    let status = Command::new(env::current_exe().unwrap())
        .args(&["--exact", case, "--nocapture", "--test-threads=1"])
        .env(ABORT_CASE_ENV, case)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(!status.success(), "{} exited normally", case);
}

// 在执行器上读取一行，并通过完成回调返回
fn read_line<R, E>(input: R, executor: &Arc<E>) -> Awaiter<io::Result<String>, E>
    where R: BufRead + Send + 'static,
          E: Executor + ?Sized + 'static {
    Awaiter::new(move |complete: Complete<io::Result<String>>, executor: &E| {
        let mut input = input;
        executor.post(move || {
            let mut line = String::new();
            let result = input
                .read_line(&mut line)
                .map(|_| line.trim_end().to_string());
            complete.complete(result);
        });
    }, executor)
}

#[test]
fn test_spawn_read_line_on_thread_pool() {
    init_logger();
    let pool = Arc::new(ThreadPool::new(12).unwrap());
    let printed = Arc::new(Mutex::new(Vec::new()));

    let printed_copy = printed.clone();
    let result = spawn(move |executor| async move {
        let line = read_line(Cursor::new("hello\n"), &executor).await?;
        printed_copy.lock().push(line);
        Ok::<_, io::Error>(())
    }, &pool);

    //spawn返回时继续已执行完成
    assert!(result.unwrap().is_ok());
    assert_eq!(*printed.lock(), vec!["hello".to_string()]);
    pool.join().unwrap();
}

#[test]
fn test_spawn_read_lines_in_order() {
    let pool = Arc::new(ThreadPool::new(4).unwrap());
    let input = Arc::new(Mutex::new(Cursor::new("first\nsecond\nthird\n")));

    let result = spawn(move |executor| async move {
        let mut lines = Vec::new();
        loop {
            let shared = input.clone();
            let line = Awaiter::new(move |complete: Complete<String>, executor: &ThreadPool| {
                executor.post(move || {
                    let mut line = String::new();
                    let _ = shared.lock().read_line(&mut line);
                    complete.complete(line.trim_end().to_string());
                });
            }, &executor).await;

            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        lines
    }, &pool);

    assert_eq!(result.unwrap(), vec!["first", "second", "third"]);
    pool.join().unwrap();
}

#[test]
fn test_spawn_with_dyn_executor() {
    let executors: Vec<Arc<dyn Executor>> = vec![
        Arc::new(InlineExecutor),
        Arc::new(ThreadPool::new(3).unwrap()),
    ];

    for executor in executors {
        let result = spawn(|executor| async move {
            let mut total = 0;
            for value in 1..=4usize {
                total += Awaiter::<usize, dyn Executor>::new(move |complete, executor| {
                    executor.post(move || complete.complete(value * value));
                }, &executor).await;
            }
            total
        }, &executor);

        assert_eq!(result.unwrap(), 30);
    }
}

#[test]
fn test_generator_feeds_spawned_computation() {
    let pool = Arc::new(ThreadPool::new(2).unwrap());

    //生成器不跨线程，先在当前线程上产出所有值
    let values: Vec<i64> = range(0, 10, 3).collect();
    let result = spawn(move |executor| async move {
        let mut squares = Vec::new();
        for value in values {
            squares.push(Awaiter::new(move |complete: Complete<i64>, executor: &ThreadPool| {
                executor.post(move || complete.complete(value * value));
            }, &executor).await);
        }
        squares
    }, &pool);

    assert_eq!(result.unwrap(), vec![0, 9, 36, 81]);
    pool.join().unwrap();
}

#[test]
fn test_thread_pool_runs_each_unit_once() {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let worker_size = rng.gen_range(1, 13);
    let unit_count = rng.gen_range(1, 1000);

    let pool = ThreadPool::new(worker_size).unwrap();
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..unit_count).map(|_| AtomicUsize::new(0)).collect());
    for index in 0..unit_count {
        let runs_copy = runs.clone();
        pool.post(move || {
            runs_copy[index].fetch_add(1, Ordering::SeqCst);
        });
    }
    pool.join().unwrap();

    assert!(runs.iter().all(|count| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_generators_side_by_side() {
    let mut evens = range(0, 10, 2);
    let mut words = Sequence::new(crate::generator::from_iter(vec!["123", "456", "789"]));
    let mut pairs = Vec::new();

    //两个生成器互不影响
    while !evens.is_done() && !words.is_done() {
        pairs.push((*evens.current().unwrap(), *words.current().unwrap()));
        evens.advance();
        words.advance();
    }
    assert_eq!(pairs, vec![(0, "123"), (2, "456"), (4, "789")]);
    assert_eq!(evens.current().ok(), Some(&6));
    assert!(words.current().is_err());

    let mut fib = {
        let (mut a, mut b) = (0u64, 1u64);
        crate::generator::Generator::new(crate::generator::from_fn(move || {
            if a > 50 {
                return GeneratorState::Complete(a);
            }
            let value = a;
            a = b;
            b += value;
            GeneratorState::Yielded(value)
        }))
    };
    let yielded: Vec<u64> = (&mut fib).collect();
    assert_eq!(yielded, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
    assert_eq!(*fib.current(), 55);
}
