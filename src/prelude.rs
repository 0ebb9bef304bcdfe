pub use crate::error::{CoroError, Result};
pub use crate::generator::{from_fn, from_iter, from_stream, range, stream,
                           Generator, GeneratorState, Range, Resumable, Routine, Sequence};
pub use crate::rt::{Executor, ExecutorExt, InlineExecutor, Work};
pub use crate::rt::awaiter::{Awaiter, Complete};
pub use crate::rt::spawn::spawn;
pub use crate::rt::thread_pool::{Lifecycle, ThreadPool, ThreadPoolBuilder};
