use std::fmt;

use crate::data_map::JobDataMap;
use crate::keys::JobKey;

/// Identifier of the factory that builds the runnable job at execution time.
///
/// The store never instantiates jobs itself; it only checks that the
/// identifier is resolvable when a stored job is decoded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct JobTypeId(pub String);

impl JobTypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored definition of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobDetail {
    pub key: JobKey,
    pub job_type: JobTypeId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    /// Durable jobs survive the removal of their last trigger.
    pub durable: bool,
    pub concurrent_execution_disallowed: bool,
    /// When set, the data map handed back on completion overwrites the stored one.
    #[cfg_attr(feature = "serde", serde(default))]
    pub persist_data_after_execution: bool,
    /// Asks the scheduler to re-run the job after a crash of the node running it.
    ///
    /// Stored and returned unchanged; the job store never acts on it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub requests_recovery: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: JobDataMap,
}

impl JobDetail {
    pub fn new(key: JobKey, job_type: JobTypeId) -> Self {
        Self {
            key,
            job_type,
            description: None,
            durable: false,
            concurrent_execution_disallowed: false,
            persist_data_after_execution: false,
            requests_recovery: false,
            data: JobDataMap::new(),
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn disallow_concurrent_execution(mut self, disallowed: bool) -> Self {
        self.concurrent_execution_disallowed = disallowed;
        self
    }

    pub fn persist_data_after_execution(mut self, persist: bool) -> Self {
        self.persist_data_after_execution = persist;
        self
    }

    pub fn requests_recovery(mut self, recover: bool) -> Self {
        self.requests_recovery = recover;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key, value);
        self
    }
}
