//! chainreduce-core: the streaming map/reduce engine behind ChainReduce.
//!
//! # Architecture
//!
//! ```text
//! engine::start ──► RunHandle (interrupt / wait / progress)
//!        │
//!        ├── Fetcher      (1 task, bounded replay or tip tailing)
//!        │      │  bounded block queue (backpressure)
//!        │      ▼
//!        ├── MapperPool   (N tasks, BlockMapReducer::map + Emitter)
//!        │      │  merge channel, closed once every mapper is done
//!        │      ▼
//!        └── Reducer      (1 task, sole writer of the accumulator)
//!               │
//!               ▼
//!        BlockMapReducer::finalize(accumulator, Checkpoint)   (exactly once)
//! ```
//!
//! Every task observes one shared `CancellationToken`; the first error any
//! task reports cancels the rest and is what [`RunHandle::wait`] returns.

pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod plugin;
pub mod registry;
pub mod source;
pub mod types;

pub use config::EngineConfig;
pub use engine::{start, Interrupter, ProgressSnapshot, RunHandle, RunProgress};
pub use error::ReduceError;
pub use memory::MemoryBlockSource;
pub use plugin::{BlockMapReducer, Emitter};
pub use registry::{Launch, PluginRegistry};
pub use source::{Block, BlockSource};
pub use types::{BlockRange, ChainTip, Checkpoint, FetchPlan};
