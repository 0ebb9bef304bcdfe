use log::warn;

use crate::error::{fatal, CoroError, Result};
use super::{Frame, GeneratorState, Resumable};

///
/// 带完成值的生成器
///
/// 完成后，当前值的读取会一直返回完成值
///
pub struct Generator<T> {
    frame: Frame<T, T>,
}

impl<T> Generator<T> {
    /// 用指定的函数体构建生成器，并立即运行到第一个产出点或完成
    pub fn new<B>(body: B) -> Self
        where B: Resumable<Yield = T, Return = T> + 'static {
        match Frame::start(body) {
            Ok(frame) => Generator { frame },
            Err((_, reason)) => fatal(CoroError::Fatal(reason)),
        }
    }

    /// 判断生成器是否已完成
    #[inline]
    pub fn is_done(&self) -> bool {
        self.frame.is_done()
    }

    /// 推进生成器到下一个产出点或完成，已完成则忽略
    pub fn advance(&mut self) {
        if let Err(reason) = self.frame.step() {
            fatal(CoroError::Fatal(reason));
        }
    }

    /// 获取当前值，已完成则获取完成值
    pub fn current(&self) -> &T {
        match self.frame.state() {
            GeneratorState::Yielded(value) => value,
            GeneratorState::Complete(value) => value,
        }
    }

    /// 获取完成值，未完成则返回空
    pub fn completion(&self) -> Option<&T> {
        match self.frame.state() {
            GeneratorState::Complete(value) => Some(value),
            _ => None,
        }
    }

    /// 推进生成器，并获取推进后的当前值，已完成则重复返回完成值
    pub fn resume(&mut self) -> &T {
        self.advance();
        self.current()
    }
}

impl<T> Iterator for Generator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.frame.step() {
            Ok(value) => value,
            Err(reason) => fatal(CoroError::Fatal(reason)),
        }
    }
}

///
/// 只有产出值的生成器
///
/// 完成后，当前值的读取会返回EndOfSequence
///
pub struct Sequence<T> {
    frame: Frame<T, ()>,
}

impl<T> Sequence<T> {
    /// 用指定的函数体构建生成器，并立即运行到第一个产出点或完成
    pub fn new<B>(body: B) -> Self
        where B: Resumable<Yield = T, Return = ()> + 'static {
        match Frame::start(body) {
            Ok(frame) => Sequence { frame },
            Err((_, reason)) => fatal(CoroError::Fatal(reason)),
        }
    }

    /// 判断生成器是否已完成
    #[inline]
    pub fn is_done(&self) -> bool {
        self.frame.is_done()
    }

    /// 推进生成器到下一个产出点或完成，已完成则忽略
    pub fn advance(&mut self) {
        if let Err(reason) = self.frame.step() {
            fatal(CoroError::Fatal(reason));
        }
    }

    /// 获取当前值
    pub fn current(&self) -> Result<&T> {
        match self.frame.state() {
            GeneratorState::Yielded(value) => Ok(value),
            GeneratorState::Complete(_) => Err(CoroError::EndOfSequence),
        }
    }

    /// 推进生成器，并获取推进后的当前值
    pub fn resume(&mut self) -> Result<&T> {
        if self.is_done() {
            return Err(CoroError::EndOfSequence);
        }

        self.advance();
        self.current()
    }
}

impl<T> Iterator for Sequence<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.frame.step() {
            Ok(value) => value,
            Err(reason) => fatal(CoroError::Fatal(reason)),
        }
    }
}

///
/// 既没有产出值也没有完成值的生成器
///
/// 函数体内部失败不会终止进程，生成器会直接完成，并保留失败原因
///
pub struct Routine {
    frame:      Frame<(), ()>,      //挂起的计算
    failure:    Option<CoroError>,  //函数体内部失败的原因
}

impl Routine {
    /// 用指定的函数体构建生成器，并立即运行到第一个挂起点或完成
    pub fn new<B>(body: B) -> Self
        where B: Resumable<Yield = (), Return = ()> + 'static {
        match Frame::start(body) {
            Ok(frame) => Routine {
                frame,
                failure: None,
            },
            Err((body, reason)) => {
                warn!("Routine failed at startup, reason: {}", reason);
                Routine {
                    frame: Frame::finished(body, ()),
                    failure: Some(CoroError::Fatal(reason)),
                }
            },
        }
    }

    /// 判断生成器是否已完成
    #[inline]
    pub fn is_done(&self) -> bool {
        self.frame.is_done()
    }

    /// 获取函数体内部失败的原因
    pub fn failure(&self) -> Option<&CoroError> {
        self.failure.as_ref()
    }

    /// 推进生成器到下一个挂起点或完成，已完成则忽略
    pub fn advance(&mut self) {
        if let Err(reason) = self.frame.step() {
            warn!("Routine failed, reason: {}", reason);
            self.frame.abandon(());
            self.failure = Some(CoroError::Fatal(reason));
        }
    }

    /// 推进生成器，已完成则返回EndOfSequence
    pub fn resume(&mut self) -> Result<()> {
        if self.is_done() {
            return Err(CoroError::EndOfSequence);
        }

        self.advance();
        Ok(())
    }
}

impl Iterator for Routine {
    type Item = ();

    fn next(&mut self) -> Option<()> {
        if self.is_done() {
            return None;
        }

        self.advance();
        Some(())
    }
}

#[cfg(test)]
fn countdown(from: usize, ret: usize) -> Generator<usize> {
    let mut next = from;
    Generator::new(super::from_fn(move || {
        if next == 0 {
            GeneratorState::Complete(ret)
        } else {
            next -= 1;
            GeneratorState::Yielded(next + 1)
        }
    }))
}

#[test]
fn test_generator_terminal_read() {
    let mut gen = countdown(2, 99);

    assert_eq!(*gen.current(), 2);
    assert_eq!(gen.completion(), None);
    assert_eq!(*gen.resume(), 1);
    assert_eq!(*gen.resume(), 99);
    assert!(gen.is_done());

    //完成后重复读取完成值
    for _ in 0..3 {
        assert_eq!(*gen.resume(), 99);
        assert_eq!(*gen.current(), 99);
    }
    assert_eq!(gen.completion(), Some(&99));
}

#[test]
fn test_generator_iterate() {
    let mut gen = countdown(3, 7);

    let values: Vec<usize> = (&mut gen).collect();
    assert_eq!(values, vec![3, 2, 1]);
    assert!(gen.is_done());
    assert_eq!(*gen.current(), 7);
    assert_eq!(gen.next(), None);
}

#[test]
fn test_generator_completes_immediately() {
    let gen = countdown(0, 5);

    assert!(gen.is_done());
    assert_eq!(*gen.current(), 5);
    assert_eq!(gen.count(), 0);
}

#[test]
fn test_sequence_end_of_sequence() {
    let mut seq = Sequence::new(super::from_iter(vec![10, 20]));

    assert_eq!(seq.current().ok(), Some(&10));
    assert_eq!(seq.resume().ok(), Some(&20));
    assert!(matches!(seq.resume(), Err(CoroError::EndOfSequence)));
    assert!(seq.is_done());

    for _ in 0..3 {
        assert!(matches!(seq.resume(), Err(CoroError::EndOfSequence)));
        assert!(matches!(seq.current(), Err(CoroError::EndOfSequence)));
    }
}

#[test]
fn test_sequence_single_pass() {
    let mut seq = Sequence::new(super::from_iter(1..=5));

    let head: Vec<i32> = (&mut seq).take(2).collect();
    assert_eq!(head, vec![1, 2]);
    assert_eq!(seq.current().ok(), Some(&3));

    let rest: Vec<i32> = (&mut seq).collect();
    assert_eq!(rest, vec![3, 4, 5]);
    assert_eq!(seq.next(), None);
}

#[test]
fn test_sequence_from_stream() {
    use super::stream;

    let seq = Sequence::new(super::from_stream(stream! {
        for word in vec!["123", "456", "789"] {
            yield word.to_string();
        }
    }));

    assert_eq!(seq.collect::<Vec<String>>(), vec!["123", "456", "789"]);
}

#[test]
fn test_routine() {
    use std::cell::Cell;
    use std::rc::Rc;

    let steps = Rc::new(Cell::new(0));
    let steps_copy = steps.clone();
    let mut routine = Routine::new(super::from_fn(move || {
        steps_copy.set(steps_copy.get() + 1);
        if steps_copy.get() < 3 {
            GeneratorState::Yielded(())
        } else {
            GeneratorState::Complete(())
        }
    }));

    assert_eq!(steps.get(), 1);
    assert!(routine.resume().is_ok());
    assert_eq!(steps.get(), 2);
    assert_eq!((&mut routine).count(), 1);
    assert_eq!(steps.get(), 3);
    assert!(routine.is_done());
    assert!(matches!(routine.resume(), Err(CoroError::EndOfSequence)));
    assert!(routine.failure().is_none());
}

#[test]
fn test_routine_keeps_failure() {
    let mut started = false;
    let mut routine = Routine::new(super::from_fn(move || {
        if started {
            panic!("routine body failed");
        }
        started = true;
        GeneratorState::Yielded(())
    }));

    assert!(!routine.is_done());
    routine.advance();
    assert!(routine.is_done());
    match routine.failure() {
        Some(CoroError::Fatal(reason)) => assert_eq!(reason, "routine body failed"),
        other => panic!("unexpected failure: {:?}", other),
    }
    assert!(matches!(routine.resume(), Err(CoroError::EndOfSequence)));

    let routine = Routine::new(super::from_fn(|| -> GeneratorState<(), ()> {
        panic!("failed at startup");
    }));
    assert!(routine.is_done());
    assert!(routine.failure().is_some());
}

#[test]
fn test_panicking_sequence_aborts() {
    crate::tests::assert_aborts("generator::shape::test_panicking_sequence_aborts", || {
        let mut step = 0;
        let mut seq = Sequence::new(super::from_fn(move || {
            step += 1;
            if step > 1 {
                panic!("body failed at {}", step);
            }
            GeneratorState::Yielded(step)
        }));
        seq.advance();
    });
}
