//! 生成器
//!
//! 生成器是一个可恢复的计算，每次推进都会同步运行到下一个产出值或完成，不需要任何执行器。
//! 生成器在构建时立即开始运行，所以第一个产出值在构建后即可读取。
//!
//! 生成器的函数体是一个显式的状态机，实现[Resumable]即可，也可以通过[from_fn]、[from_iter]或[from_stream]构建。
//!
//! [Resumable]: trait.Resumable.html
//! [from_fn]: fn.from_fn.html
//! [from_iter]: fn.from_iter.html
//! [from_stream]: fn.from_stream.html

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::task::{Context, Poll};

use futures::{stream::{LocalBoxStream, Stream, StreamExt},
              task::noop_waker_ref};

use crate::error::panic_message;

mod range;
mod shape;

pub use shape::{Generator, Routine, Sequence};
pub use range::{range, Range};

/// 用于编写异步流函数体的宏，配合[from_stream]使用
pub use async_stream::stream;

///
/// 生成器函数体的一次恢复结果
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState<Y, R> {
    Yielded(Y),     //产出一个值，并在此处挂起
    Complete(R),    //已完成，并返回完成值
}

///
/// 可恢复的函数体，每次恢复都运行到下一个产出点或完成
///
/// 完成后不会再被恢复
///
pub trait Resumable {
    type Yield;
    type Return;

    /// 从上一个挂起点恢复运行
    fn resume(&mut self) -> GeneratorState<Self::Yield, Self::Return>;
}

impl<B: Resumable + ?Sized> Resumable for Box<B> {
    type Yield = B::Yield;
    type Return = B::Return;

    fn resume(&mut self) -> GeneratorState<Self::Yield, Self::Return> {
        (**self).resume()
    }
}

///
/// 由闭包构建的函数体
///
pub struct FromFn<F>(F);

impl<F, Y, R> Resumable for FromFn<F>
    where F: FnMut() -> GeneratorState<Y, R> {
    type Yield = Y;
    type Return = R;

    #[inline]
    fn resume(&mut self) -> GeneratorState<Y, R> {
        (self.0)()
    }
}

/// 用闭包构建函数体，闭包每次调用相当于一次恢复
pub fn from_fn<F, Y, R>(f: F) -> FromFn<F>
    where F: FnMut() -> GeneratorState<Y, R> {
    FromFn(f)
}

///
/// 由迭代器构建的函数体
///
pub struct FromIter<I>(I);

impl<I: Iterator> Resumable for FromIter<I> {
    type Yield = I::Item;
    type Return = ();

    fn resume(&mut self) -> GeneratorState<I::Item, ()> {
        match self.0.next() {
            Some(value) => GeneratorState::Yielded(value),
            None => GeneratorState::Complete(()),
        }
    }
}

/// 用迭代器构建函数体，迭代器结束即完成
pub fn from_iter<I>(iter: I) -> FromIter<I::IntoIter>
    where I: IntoIterator {
    FromIter(iter.into_iter())
}

///
/// 由异步流构建的函数体
///
/// 异步流只会被同步推动，如果异步流需要等待外部事件，则视为函数体内部失败
///
pub struct StreamBody<T>(LocalBoxStream<'static, T>);

impl<T> Resumable for StreamBody<T> {
    type Yield = T;
    type Return = ();

    fn resume(&mut self) -> GeneratorState<T, ()> {
        let mut context = Context::from_waker(noop_waker_ref());
        match self.0.as_mut().poll_next(&mut context) {
            Poll::Ready(Some(value)) => GeneratorState::Yielded(value),
            Poll::Ready(None) => GeneratorState::Complete(()),
            Poll::Pending => {
                //生成器不能跨调度挂起
                panic!("Generator body suspended on an external event");
            },
        }
    }
}

/// 用异步流构建函数体，通常配合stream!使用
pub fn from_stream<S>(stream: S) -> StreamBody<S::Item>
    where S: Stream + 'static {
    StreamBody(stream.boxed_local())
}

// 类型擦除后的函数体
pub(crate) type BoxedBody<Y, R> = Box<dyn Resumable<Yield = Y, Return = R>>;

// 挂起的计算，持有函数体和最近一次恢复的结果
pub(crate) struct Frame<Y, R> {
    body:   BoxedBody<Y, R>,                            //函数体
    state:  GeneratorState<Y, R>,                       //最近一次的产出值或完成值
}

impl<Y, R> Frame<Y, R> {
    // 构建并立即运行到第一个产出点或完成，函数体失败时返回失败原因
    pub(crate) fn start<B>(body: B) -> Result<Self, (BoxedBody<Y, R>, String)>
        where B: Resumable<Yield = Y, Return = R> + 'static {
        let mut body: BoxedBody<Y, R> = Box::new(body);
        match resume_body(&mut body) {
            Ok(state) => Ok(Frame { body, state }),
            Err(reason) => Err((body, reason)),
        }
    }

    // 用指定的状态构建，函数体不会再被恢复
    pub(crate) fn finished(body: BoxedBody<Y, R>, ret: R) -> Self {
        Frame {
            body,
            state: GeneratorState::Complete(ret),
        }
    }

    #[inline]
    pub(crate) fn is_done(&self) -> bool {
        if let GeneratorState::Complete(_) = self.state {
            true
        } else {
            false
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> &GeneratorState<Y, R> {
        &self.state
    }

    // 未完成则运行到下一个产出点或完成，返回被替换的上一个产出值
    pub(crate) fn step(&mut self) -> Result<Option<Y>, String> {
        if self.is_done() {
            return Ok(None);
        }

        let next = resume_body(&mut self.body)?;
        match mem::replace(&mut self.state, next) {
            GeneratorState::Yielded(value) => Ok(Some(value)),
            GeneratorState::Complete(_) => Ok(None),
        }
    }

    // 函数体失败后强制完成
    pub(crate) fn abandon(&mut self, ret: R) {
        self.state = GeneratorState::Complete(ret);
    }
}

// 恢复函数体，并捕获函数体内部的失败
fn resume_body<Y, R>(body: &mut BoxedBody<Y, R>) -> Result<GeneratorState<Y, R>, String> {
    panic::catch_unwind(AssertUnwindSafe(|| body.resume()))
        .map_err(|payload| panic_message(&*payload))
}

#[test]
fn test_frame_starts_eagerly() {
    use std::cell::Cell;
    use std::rc::Rc;

    let resumed = Rc::new(Cell::new(0));
    let resumed_copy = resumed.clone();
    let frame = Frame::start(from_fn(move || {
        resumed_copy.set(resumed_copy.get() + 1);
        GeneratorState::<usize, ()>::Yielded(resumed_copy.get())
    })).ok().unwrap();

    assert_eq!(resumed.get(), 1);
    assert_eq!(frame.state(), &GeneratorState::Yielded(1));
}

#[test]
fn test_frame_step_returns_previous() {
    let mut frame = Frame::start(from_iter(vec!["a", "b"])).ok().unwrap();

    assert_eq!(frame.step(), Ok(Some("a")));
    assert_eq!(frame.state(), &GeneratorState::Yielded("b"));
    assert_eq!(frame.step(), Ok(Some("b")));
    assert!(frame.is_done());
    assert_eq!(frame.step(), Ok(None));
}

#[test]
fn test_frame_catches_body_failure() {
    let mut count = 0;
    let result = Frame::start(from_fn(move || {
        count += 1;
        if count > 1 {
            panic!("body failed at {}", count);
        }
        GeneratorState::<usize, ()>::Yielded(count)
    }));

    let mut frame = match result {
        Ok(frame) => frame,
        Err((_, reason)) => panic!("unexpected failure: {}", reason),
    };
    assert_eq!(frame.step(), Err("body failed at 2".to_string()));

    frame.abandon(());
    assert!(frame.is_done());
}

#[test]
fn test_stream_body() {
    let mut body = from_stream(stream! {
        for word in vec!["123", "456", "789"] {
            yield word.to_string();
        }
    });

    assert_eq!(body.resume(), GeneratorState::Yielded("123".to_string()));
    assert_eq!(body.resume(), GeneratorState::Yielded("456".to_string()));
    assert_eq!(body.resume(), GeneratorState::Yielded("789".to_string()));
    assert_eq!(body.resume(), GeneratorState::Complete(()));
}

#[test]
#[should_panic(expected = "suspended on an external event")]
fn test_stream_body_cannot_suspend() {
    let mut body = from_stream(futures::stream::pending::<usize>());
    let _ = body.resume();
}
