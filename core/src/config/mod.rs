mod load;
mod types;

pub use load::{get_reflow_data_dir, load_default, load_from_path};
pub use types::{
    AppConfig, CommandExecutorConfig, ExecutorConfig, InputConfig, LoggingConfig, QualityConfig,
    StaticExecutorConfig, StorageConfig, Weighting,
};
