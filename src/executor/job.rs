use serde::{Deserialize, Serialize};

/// A package the executor unpacks into the job's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPackage {
    #[serde(rename = "url")]
    pub source_uri: String,
    #[serde(rename = "dest", default, skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
}

impl InputPackage {
    pub fn new(source_uri: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            dest_path: None,
        }
    }

    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest_path = Some(dest.into());
        self
    }
}

/// One unit of remote work: a shell command, the packages it needs and the
/// blob prefix its outputs are written under.
///
/// Serializes to the executor's wire format
/// `{"cmd": .., "pkgs": [{"url": .., "dest": ..}], "out": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    #[serde(rename = "cmd")]
    command: String,
    #[serde(rename = "pkgs")]
    inputs: Vec<InputPackage>,
    #[serde(rename = "out")]
    output_uri: String,
}

impl JobDescriptor {
    pub fn new(command: impl Into<String>, output_uri: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            inputs: Vec::new(),
            output_uri: output_uri.into(),
        }
    }

    pub fn with_input(mut self, input: InputPackage) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn inputs(&self) -> &[InputPackage] {
        &self.inputs
    }

    pub fn output_uri(&self) -> &str {
        &self.output_uri
    }
}

/// What the executor reported for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// Exit code of the job; absent for transient outcomes
    pub exit_code: Option<i32>,
    /// The executor was over capacity; the job should be resubmitted
    pub transient: bool,
}

impl JobOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            transient: false,
        }
    }

    pub fn transient() -> Self {
        Self {
            exit_code: None,
            transient: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.transient && self.exit_code == Some(0)
    }
}
