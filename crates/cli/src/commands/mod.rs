pub(crate) mod call;
pub(crate) mod functions;
pub(crate) mod module;
pub(crate) mod seed;

use std::time::Duration;

use vesta_eval::{Collaborators, Evaluator};

use crate::config::VestaConfig;

/// Evaluator over the real system, configured from `config`.
pub(crate) fn evaluator(config: &VestaConfig) -> Evaluator {
    let timeout = Duration::from_secs(config.network_timeout_secs);
    Evaluator::new(Collaborators::system_with_timeout(timeout)).with_workdir(&config.workdir)
}
