//! Persisted domain types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Lifecycle status of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    Submitted,
    Validated,
    NotRelevant,
    Duplicate,
    Error,
    NotFound,
    IndividualRecord,
}

impl UrlStatus {
    pub const ALL: [UrlStatus; 8] = [
        UrlStatus::Pending,
        UrlStatus::Submitted,
        UrlStatus::Validated,
        UrlStatus::NotRelevant,
        UrlStatus::Duplicate,
        UrlStatus::Error,
        UrlStatus::NotFound,
        UrlStatus::IndividualRecord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Pending => "pending",
            UrlStatus::Submitted => "submitted",
            UrlStatus::Validated => "validated",
            UrlStatus::NotRelevant => "not_relevant",
            UrlStatus::Duplicate => "duplicate",
            UrlStatus::Error => "error",
            UrlStatus::NotFound => "not_found",
            UrlStatus::IndividualRecord => "individual_record",
        }
    }

    /// Statuses an operator may still move a URL out of
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UrlStatus::Pending | UrlStatus::Error)
    }
}

impl std::fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UrlStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UrlStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.to_lowercase())
            .ok_or_else(|| Error::Parse(format!("Unknown URL status: {}", s)))
    }
}

/// How a URL row came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlSource {
    Collector,
    Manual,
    Redirect,
    RootUrl,
}

impl std::fmt::Display for UrlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlSource::Collector => write!(f, "collector"),
            UrlSource::Manual => write!(f, "manual"),
            UrlSource::Redirect => write!(f, "redirect"),
            UrlSource::RootUrl => write!(f, "root_url"),
        }
    }
}

impl FromStr for UrlSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "collector" => Ok(UrlSource::Collector),
            "manual" => Ok(UrlSource::Manual),
            "redirect" => Ok(UrlSource::Redirect),
            "root_url" => Ok(UrlSource::RootUrl),
            _ => Err(Error::Parse(format!("Unknown URL source: {}", s))),
        }
    }
}

/// Status of a task record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProcess,
    ReadyToLabel,
    Error,
    Aborted,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::InProcess => write!(f, "in_process"),
            TaskStatus::ReadyToLabel => write!(f, "ready_to_label"),
            TaskStatus::Error => write!(f, "error"),
            TaskStatus::Aborted => write!(f, "aborted"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "in_process" => Ok(TaskStatus::InProcess),
            "ready_to_label" => Ok(TaskStatus::ReadyToLabel),
            "error" => Ok(TaskStatus::Error),
            "aborted" => Ok(TaskStatus::Aborted),
            _ => Err(Error::Parse(format!("Unknown task status: {}", s))),
        }
    }
}

/// Stable identifier of every task kind, URL operators and scheduled operators alike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Probe,
    Html,
    Duplicate,
    #[serde(rename = "probe_404")]
    Probe404,
    RecordType,
    AgencyIdentification,
    RootUrl,
    MiscMetadata,
    SubmitApproved,
    Relevancy,
    RunUrlTasks,
    PopulateBacklogSnapshot,
}

impl TaskType {
    pub const ALL: [TaskType; 12] = [
        TaskType::Probe,
        TaskType::Html,
        TaskType::Duplicate,
        TaskType::Probe404,
        TaskType::RecordType,
        TaskType::AgencyIdentification,
        TaskType::RootUrl,
        TaskType::MiscMetadata,
        TaskType::SubmitApproved,
        TaskType::Relevancy,
        TaskType::RunUrlTasks,
        TaskType::PopulateBacklogSnapshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Probe => "probe",
            TaskType::Html => "html",
            TaskType::Duplicate => "duplicate",
            TaskType::Probe404 => "probe_404",
            TaskType::RecordType => "record_type",
            TaskType::AgencyIdentification => "agency_identification",
            TaskType::RootUrl => "root_url",
            TaskType::MiscMetadata => "misc_metadata",
            TaskType::SubmitApproved => "submit_approved",
            TaskType::Relevancy => "relevancy",
            TaskType::RunUrlTasks => "run_url_tasks",
            TaskType::PopulateBacklogSnapshot => "populate_backlog_snapshot",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.to_lowercase();
        TaskType::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == s)
            .ok_or_else(|| Error::Parse(format!("Unknown task type: {}", s)))
    }
}

/// Record types a URL can be classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "Accident Reports")]
    AccidentReports,
    #[serde(rename = "Arrest Records")]
    ArrestRecords,
    #[serde(rename = "Calls for Service")]
    CallsForService,
    #[serde(rename = "Car GPS")]
    CarGps,
    #[serde(rename = "Citations")]
    Citations,
    #[serde(rename = "Dispatch Logs")]
    DispatchLogs,
    #[serde(rename = "Dispatch Recordings")]
    DispatchRecordings,
    #[serde(rename = "Field Contacts")]
    FieldContacts,
    #[serde(rename = "Incident Reports")]
    IncidentReports,
    #[serde(rename = "Misc Police Activity")]
    MiscPoliceActivity,
    #[serde(rename = "Officer Involved Shootings")]
    OfficerInvolvedShootings,
    #[serde(rename = "Stops")]
    Stops,
    #[serde(rename = "Surveys")]
    Surveys,
    #[serde(rename = "Use of Force Reports")]
    UseOfForceReports,
    #[serde(rename = "Vehicle Pursuits")]
    VehiclePursuits,
    #[serde(rename = "Complaints & Misconduct")]
    ComplaintsAndMisconduct,
    #[serde(rename = "Daily Activity Logs")]
    DailyActivityLogs,
    #[serde(rename = "Training & Hiring Info")]
    TrainingAndHiringInfo,
    #[serde(rename = "Personnel Records")]
    PersonnelRecords,
    #[serde(rename = "Annual & Monthly Reports")]
    AnnualAndMonthlyReports,
    #[serde(rename = "Budgets & Finances")]
    BudgetsAndFinances,
    #[serde(rename = "Contact Info & Agency Meta")]
    ContactInfoAndAgencyMeta,
    #[serde(rename = "Geographic")]
    Geographic,
    #[serde(rename = "List of Data Sources")]
    ListOfDataSources,
    #[serde(rename = "Policies & Contracts")]
    PoliciesAndContracts,
    #[serde(rename = "Crime Maps & Reports")]
    CrimeMapsAndReports,
    #[serde(rename = "Crime Statistics")]
    CrimeStatistics,
    #[serde(rename = "Media Bulletins")]
    MediaBulletins,
    #[serde(rename = "Records Request Info")]
    RecordsRequestInfo,
    #[serde(rename = "Resources")]
    Resources,
    #[serde(rename = "Sex Offender Registry")]
    SexOffenderRegistry,
    #[serde(rename = "Wanted Persons")]
    WantedPersons,
    #[serde(rename = "Booking Reports")]
    BookingReports,
    #[serde(rename = "Court Cases")]
    CourtCases,
    #[serde(rename = "Incarceration Records")]
    IncarcerationRecords,
    #[serde(rename = "Other")]
    Other,
}

impl RecordType {
    /// Display label, identical to the serialized form
    pub fn label(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "Other".to_string())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| Error::Parse(format!("Unknown record type: {}", s)))
    }
}

/// A URL row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    pub status: String,
    pub source: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub record_type: Option<String>,
    pub collector_metadata: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UrlRecord {
    pub fn get_status(&self) -> Result<UrlStatus> {
        self.status.parse()
    }
}

/// Minimal id/url pair selected by operator prerequisite queries
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UrlMapping {
    pub url_id: i64,
    pub url: String,
}

/// A task row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub task_type: String,
    pub task_status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRecord {
    pub fn get_status(&self) -> Result<TaskStatus> {
        self.task_status.parse()
    }
}

/// Task row joined with its link count and latest error
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: i64,
    pub task_type: String,
    pub task_status: String,
    pub url_count: i64,
    pub error: Option<String>,
    pub updated_at: String,
}

/// Latest probe outcome for a URL
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WebMetadata {
    pub url_id: i64,
    pub accessed: bool,
    pub status_code: Option<i64>,
    pub content_type: Option<String>,
    pub error_message: Option<String>,
}

/// Directed redirect edge
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RedirectLink {
    pub source_url_id: i64,
    pub destination_url_id: i64,
}

/// Per-URL failure recorded by a task
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UrlErrorInfo {
    pub task_id: i64,
    pub url_id: i64,
    pub error: String,
}

/// One parsed HTML field stored for a URL
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct HtmlContentRow {
    pub url_id: i64,
    pub content_type: String,
    pub content: String,
}

/// Outcome of an HTML fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    Error,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Success => "success",
            ScrapeStatus::Error => "error",
        }
    }
}

/// Optional catalogue fields gathered for a URL before submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalMetadata {
    #[serde(default)]
    pub record_formats: Vec<String>,
    #[serde(default)]
    pub data_portal_type: Option<String>,
    #[serde(default)]
    pub supplying_entity: Option<String>,
}

/// Status counts across the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub url_count: usize,
    pub urls_by_status: Vec<(String, usize)>,
    pub task_count: usize,
    pub tasks_by_status: Vec<(String, usize)>,
    pub redirect_link_count: usize,
    pub latest_backlog: Option<i64>,
}
