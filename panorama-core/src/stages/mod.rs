//! The built-in stage workers.
//!
//! `research` gathers evidence from search providers, `synthesis` turns it
//! into the core analysis, and the component workers derive drivers,
//! objections, and forecast from the synthesis. Workers are registered by
//! stage name when the pipeline is assembled.

pub mod component;
pub mod decode;
pub(crate) mod prompt;
pub mod research;
pub mod synthesis;

pub use component::ComponentWorker;
pub use research::ResearchWorker;
pub use synthesis::SynthesisWorker;

use std::collections::HashMap;
use std::sync::Arc;

use crate::pipeline::stage::{
    StageWorker, STAGE_DRIVERS, STAGE_FORECAST, STAGE_OBJECTIONS, STAGE_RESEARCH, STAGE_SYNTHESIS,
};

/// The worker set for the standard stage plan.
pub fn standard_workers() -> HashMap<String, Arc<dyn StageWorker>> {
    let mut workers: HashMap<String, Arc<dyn StageWorker>> = HashMap::new();
    workers.insert(STAGE_RESEARCH.into(), Arc::new(ResearchWorker::new()));
    workers.insert(STAGE_SYNTHESIS.into(), Arc::new(SynthesisWorker::new()));
    workers.insert(STAGE_DRIVERS.into(), Arc::new(ComponentWorker::drivers()));
    workers.insert(
        STAGE_OBJECTIONS.into(),
        Arc::new(ComponentWorker::objections()),
    );
    workers.insert(STAGE_FORECAST.into(), Arc::new(ComponentWorker::forecast()));
    workers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::StagePlan;

    #[test]
    fn test_standard_workers_cover_standard_plan() {
        let workers = standard_workers();
        for spec in &StagePlan::standard(true).stages {
            assert!(workers.contains_key(&spec.name), "missing {}", spec.name);
        }
    }
}
