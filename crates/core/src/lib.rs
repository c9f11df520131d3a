pub mod config;
pub mod engine;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod pool;
pub mod testing;
pub mod worker;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use engine::{EncodedImage, EngineError, ImageFormat, InputFile};
pub use job::{ConversionJob, JobStatus, PartialChain};
pub use orchestrator::{
    ConversionFailure, ConversionOrchestrator, ConversionOutput, ConversionUpdate,
    OrchestratorConfig, OrchestratorStatus,
};
pub use pipeline::{ConversionError, ConversionResult, ErrorKind, Pipeline};
pub use pool::PoolStatus;
