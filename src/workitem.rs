//! Documents exchanged with the `WorkItems` endpoints.
//!
//! Requests carry the OData type annotations the service expects; responses
//! are requested with `odata.metadata=minimal`, so annotations are optional
//! when reading.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Activity that plots every layout of a drawing into a single PDF.
pub const PLOT_TO_PDF: &str = "PlotToPDF";

/// Public sample drawing used when no input is given.
pub const SAMPLE_DRAWING: &str =
    "http://download.autodesk.com/us/samplefiles/acad/blocks_and_tables_-_imperial.dwg";

const WORK_ITEM_TYPE: &str = "#ACES.Models.WorkItem";
const ARGUMENTS_TYPE: &str = "#ACES.Models.Arguments";
const ARGUMENT_TYPE: &str = "#ACES.Models.Argument";
const ARGUMENT_COLLECTION_TYPE: &str = "#Collection(ACES.Models.Argument)";
const HTTP_VERB_TYPE: &str = "#ACES.Models.HttpVerbType";
const STORAGE_PROVIDER_TYPE: &str = "#ACES.Models.StorageProvider";

fn odata(t: &str) -> Option<String> {
    Some(t.to_string())
}

/// A job submitted to `POST /WorkItems`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkItem {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    pub activity_id: String,
    pub arguments: Arguments,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Arguments {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    #[serde(
        rename = "InputArguments@odata.type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_arguments_type: Option<String>,
    #[serde(default)]
    pub input_arguments: Vec<Argument>,
    #[serde(
        rename = "OutputArguments@odata.type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_arguments_type: Option<String>,
    #[serde(default)]
    pub output_arguments: Vec<Argument>,
}

/// A named input or output binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Argument {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    pub name: String,
    /// Remote location. Left out on outputs to let the service store the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(
        rename = "HttpVerb@odata.type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub http_verb_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_verb: Option<HttpVerb>,
    #[serde(
        rename = "StorageProvider@odata.type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub storage_provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_provider: Option<StorageProvider>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Head,
    Post,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageProvider {
    /// Plain HTTP storage; the service's own when no resource is given.
    Generic,
    #[serde(other)]
    Other,
}

impl Argument {
    pub fn input(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            odata_type: odata(ARGUMENT_TYPE),
            name: name.into(),
            resource: Some(resource.into()),
            ..Default::default()
        }
    }

    /// Output uploaded with `POST` to `resource`, or to service-managed
    /// storage when `resource` is `None`.
    pub fn output(name: impl Into<String>, resource: Option<String>) -> Self {
        Self {
            odata_type: odata(ARGUMENT_TYPE),
            name: name.into(),
            resource,
            http_verb_type: odata(HTTP_VERB_TYPE),
            http_verb: Some(HttpVerb::Post),
            storage_provider_type: odata(STORAGE_PROVIDER_TYPE),
            storage_provider: Some(StorageProvider::Generic),
        }
    }
}

impl WorkItem {
    pub fn new(activity_id: impl Into<String>, inputs: Vec<Argument>, outputs: Vec<Argument>) -> Self {
        Self {
            odata_type: odata(WORK_ITEM_TYPE),
            activity_id: activity_id.into(),
            arguments: Arguments {
                odata_type: odata(ARGUMENTS_TYPE),
                input_arguments_type: odata(ARGUMENT_COLLECTION_TYPE),
                input_arguments: inputs,
                output_arguments_type: odata(ARGUMENT_COLLECTION_TYPE),
                output_arguments: outputs,
            },
        }
    }

    /// `PlotToPDF` on the drawing at `drawing_url`, result kept in service storage.
    pub fn plot_to_pdf(drawing_url: impl Into<String>) -> Self {
        Self::new(
            PLOT_TO_PDF,
            vec![Argument::input("HostDwg", drawing_url)],
            vec![Argument::output("Result", None)],
        )
    }
}

/// Opaque identifier assigned by the service on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::MissingField("Id"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Work item state as reported by `WorkItems('{id}')/Status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Cancelled,
    /// One of the `Failed*` states (`FailedDownload`, `FailedInstructions`, ...).
    Failed(String),
    Other(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::InProgress => "InProgress",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Failed(s) | JobStatus::Other(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Pending" => JobStatus::Pending,
            "InProgress" => JobStatus::InProgress,
            "Succeeded" => JobStatus::Succeeded,
            "Cancelled" => JobStatus::Cancelled,
            _ if s.starts_with("Failed") => JobStatus::Failed(s),
            _ => JobStatus::Other(s),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        JobStatus::from(s.to_string())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitReply {
    #[serde(rename = "Id")]
    pub(crate) id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusReply {
    pub(crate) value: JobStatus,
}

/// Full `WorkItems('{id}')` representation, reduced to what result retrieval reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WorkItemResource {
    pub(crate) arguments: ResourceArguments,
    pub(crate) status_details: StatusDetails,
}

/// Only the output locations; inputs and per-argument metadata are not read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ResourceArguments {
    #[serde(default)]
    pub(crate) output_arguments: Vec<OutputRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OutputRef {
    #[serde(default)]
    pub(crate) resource: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StatusDetails {
    #[serde(default)]
    pub(crate) report: Option<String>,
}

/// Where the finished job's files can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub output_url: String,
    pub report_url: String,
}

impl WorkItemResource {
    pub(crate) fn into_result(self) -> Result<JobResult> {
        let output_url = self
            .arguments
            .output_arguments
            .into_iter()
            .next()
            .ok_or(Error::MissingField("Arguments.OutputArguments[0]"))?
            .resource
            .filter(|r| !r.trim().is_empty())
            .ok_or(Error::MissingField("Arguments.OutputArguments[0].Resource"))?;
        let report_url = self
            .status_details
            .report
            .filter(|r| !r.trim().is_empty())
            .ok_or(Error::MissingField("StatusDetails.Report"))?;

        Ok(JobResult {
            output_url,
            report_url,
        })
    }
}
