pub mod agents;
pub mod errors;
pub mod paths;
pub mod queue;
pub mod rouge_config;
pub mod telemetry;
pub mod util;
pub mod worker;
pub mod workflow;
