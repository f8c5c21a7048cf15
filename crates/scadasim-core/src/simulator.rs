//! End-to-end simulation entry point

use scadasim_rdbc::connection::ConnectionConfig;
use scadasim_rdbc::provider::open_adapter_with_config;
use tracing::{info, warn};

use crate::driver::TimeSeriesDriver;
use crate::error::{Result, SimError};
use crate::params::RunParameters;
use crate::progress::{ProgressListener, RunSummary};

/// Resolves a provider descriptor and runs one simulation
///
/// The descriptor is parsed and the parameters validated before any
/// connection is opened.
#[derive(Clone)]
pub struct Simulator {
    descriptor: String,
    params: RunParameters,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the descriptor may carry a password
        f.debug_struct("Simulator")
            .field("descriptor", &ConnectionConfig::parse(&self.descriptor).ok())
            .field("params", &self.params)
            .finish()
    }
}

impl Simulator {
    /// Create a simulator
    pub fn new(descriptor: impl Into<String>, params: RunParameters) -> Self {
        Self {
            descriptor: descriptor.into(),
            params,
        }
    }

    /// Run parameters
    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Run the simulation to completion
    pub async fn run(&self, listener: &mut dyn ProgressListener) -> Result<RunSummary> {
        let (config, mut driver) = match self.prepare() {
            Ok(prepared) => prepared,
            Err(err) => {
                listener.on_failure(&err);
                return Err(err);
            }
        };

        let adapter = match open_adapter_with_config(&config).await {
            Ok(adapter) => adapter,
            Err(err) => {
                let err = SimError::from(err);
                listener.on_failure(&err);
                return Err(err);
            }
        };
        info!(provider = %config.provider, table = %self.params.table, "starting simulation");

        let result = driver.run(adapter.as_ref(), listener).await;

        if let Err(err) = adapter.close().await {
            warn!(error = %err, "failed to close connection");
        }
        result
    }

    fn prepare(&self) -> Result<(ConnectionConfig, TimeSeriesDriver)> {
        let config = ConnectionConfig::parse(&self.descriptor)?;
        self.params.validate_window()?;
        let driver = TimeSeriesDriver::new(self.params.clone())?;
        Ok((config, driver))
    }
}
