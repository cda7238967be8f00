//! Command and response model for DIMSE exchanges

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use dicom_dictionary_std::uids;
use serde::{Deserialize, Serialize};

/// DIMSE operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimseCommand {
    /// C-ECHO command
    Echo,
    /// C-FIND command
    Find,
    /// C-MOVE command
    Move,
    /// C-GET command
    Get,
    /// C-STORE command
    Store,
}

impl DimseCommand {
    /// Name of the request primitive
    pub fn name(&self) -> &'static str {
        match self {
            DimseCommand::Echo => "C-ECHO",
            DimseCommand::Find => "C-FIND",
            DimseCommand::Move => "C-MOVE",
            DimseCommand::Get => "C-GET",
            DimseCommand::Store => "C-STORE",
        }
    }
}

impl fmt::Display for DimseCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DIMSE operation status
///
/// Encoded on the wire as the raw PS3.7 status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum DimseStatus {
    /// Operation completed successfully
    Success,
    /// Operation is pending (more responses to follow)
    Pending,
    /// Operation cancelled by user
    Cancel,
    /// Operation failed with error
    Failure(u16),
    /// Warning occurred during operation
    Warning(u16),
}

pub const STATUS_SUCCESS: u16 = 0x0000;
pub const STATUS_PENDING: u16 = 0xFF00;
pub const STATUS_PENDING_WARNING: u16 = 0xFF01;
pub const STATUS_CANCEL: u16 = 0xFE00;

impl DimseStatus {
    /// Classify a raw status code
    pub fn from_code(code: u16) -> Self {
        match code {
            STATUS_SUCCESS => DimseStatus::Success,
            STATUS_PENDING | STATUS_PENDING_WARNING => DimseStatus::Pending,
            STATUS_CANCEL => DimseStatus::Cancel,
            0x0001 | 0x0107 | 0x0116 | 0xB000..=0xBFFF => DimseStatus::Warning(code),
            _ => DimseStatus::Failure(code),
        }
    }

    /// Raw status code
    pub fn code(&self) -> u16 {
        match self {
            DimseStatus::Success => STATUS_SUCCESS,
            DimseStatus::Pending => STATUS_PENDING,
            DimseStatus::Cancel => STATUS_CANCEL,
            DimseStatus::Failure(code) | DimseStatus::Warning(code) => *code,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, DimseStatus::Pending)
    }

    /// Success, including success with warnings
    pub fn is_success(&self) -> bool {
        matches!(self, DimseStatus::Success | DimseStatus::Warning(_))
    }

    /// Any status that terminates an exchange
    pub fn is_final(&self) -> bool {
        !self.is_pending()
    }
}

impl From<u16> for DimseStatus {
    fn from(code: u16) -> Self {
        DimseStatus::from_code(code)
    }
}

impl From<DimseStatus> for u16 {
    fn from(status: DimseStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for DimseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimseStatus::Success => write!(f, "SUCCESS"),
            DimseStatus::Pending => write!(f, "PENDING"),
            DimseStatus::Cancel => write!(f, "CANCEL"),
            DimseStatus::Failure(code) => write!(f, "FAILURE(0x{:04X})", code),
            DimseStatus::Warning(code) => write!(f, "WARNING(0x{:04X})", code),
        }
    }
}

/// Query parameters for C-FIND and C-GET operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindQuery {
    /// Query level (PATIENT, STUDY, SERIES, IMAGE)
    pub query_level: QueryLevel,

    /// Query parameters as DICOM keywords and values
    pub parameters: HashMap<String, String>,

    /// Maximum number of results to return (0 = unlimited)
    pub max_results: u32,
}

/// Query parameters for C-MOVE operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveQuery {
    /// Query level (PATIENT, STUDY, SERIES, IMAGE)
    pub query_level: QueryLevel,

    /// Query parameters as DICOM keywords and values
    pub parameters: HashMap<String, String>,

    /// Destination AE Title for the move operation
    pub destination_aet: String,
}

/// DICOM query/retrieve levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryLevel {
    /// Patient level
    Patient,
    /// Study level
    Study,
    /// Series level
    Series,
    /// Image level
    Image,
}

/// Query/retrieve information model root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryRoot {
    Patient,
    Study,
}

/// Request priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Low priority
    Low,
    /// Medium priority (default)
    #[default]
    Medium,
    /// High priority
    High,
}

/// A composite object to send with C-STORE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreObject {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    /// Encoded dataset
    pub data: Vec<u8>,
}

/// Request payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestPayload {
    Echo,
    Find(FindQuery),
    Move(MoveQuery),
    Get(FindQuery),
    Store(StoreObject),
}

/// An outbound DIMSE request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseRequest {
    pub message_id: u16,
    pub command: DimseCommand,
    pub affected_sop_class_uid: String,
    #[serde(default)]
    pub priority: Priority,
    pub payload: RequestPayload,
}

/// Sub-operation counters reported by C-MOVE and C-GET responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOperations {
    pub remaining: u32,
    pub completed: u32,
    pub failed: u32,
    pub warning: u32,
}

/// Response payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// No dataset attached
    None,
    /// A matching identifier (C-FIND pending responses)
    Identifier(BTreeMap<String, String>),
    /// Sub-operation progress (C-MOVE, C-GET)
    SubOperations(SubOperations),
    /// Error comment sent by the peer
    Error { comment: String },
}

/// An inbound DIMSE response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimseResponse {
    pub message_id_being_responded_to: u16,
    pub command: DimseCommand,
    pub status: DimseStatus,
    pub payload: ResponsePayload,
}

impl DimseRequest {
    /// Create a new C-ECHO request
    pub fn echo(message_id: u16) -> Self {
        Self {
            message_id,
            command: DimseCommand::Echo,
            affected_sop_class_uid: uids::VERIFICATION.to_string(),
            priority: Priority::Medium,
            payload: RequestPayload::Echo,
        }
    }

    /// Create a new C-FIND request
    pub fn find(message_id: u16, query: FindQuery, root: QueryRoot) -> Self {
        let affected_sop_class_uid = match root {
            QueryRoot::Patient => uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
            QueryRoot::Study => uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
        };
        Self {
            message_id,
            command: DimseCommand::Find,
            affected_sop_class_uid: affected_sop_class_uid.to_string(),
            priority: Priority::Medium,
            payload: RequestPayload::Find(query),
        }
    }

    /// Create a new C-MOVE request
    pub fn move_request(message_id: u16, query: MoveQuery, root: QueryRoot) -> Self {
        let affected_sop_class_uid = match root {
            QueryRoot::Patient => uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE,
            QueryRoot::Study => uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE,
        };
        Self {
            message_id,
            command: DimseCommand::Move,
            affected_sop_class_uid: affected_sop_class_uid.to_string(),
            priority: Priority::Medium,
            payload: RequestPayload::Move(query),
        }
    }

    /// Create a new C-GET request
    pub fn get(message_id: u16, query: FindQuery, root: QueryRoot, priority: Priority) -> Self {
        let affected_sop_class_uid = match root {
            QueryRoot::Patient => uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_GET,
            QueryRoot::Study => uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_GET,
        };
        Self {
            message_id,
            command: DimseCommand::Get,
            affected_sop_class_uid: affected_sop_class_uid.to_string(),
            priority,
            payload: RequestPayload::Get(query),
        }
    }

    /// Create a new C-STORE request
    pub fn store(message_id: u16, object: StoreObject) -> Self {
        Self {
            message_id,
            command: DimseCommand::Store,
            affected_sop_class_uid: object.sop_class_uid.clone(),
            priority: Priority::Medium,
            payload: RequestPayload::Store(object),
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl DimseResponse {
    /// Create a response without payload
    pub fn new(message_id_being_responded_to: u16, command: DimseCommand, status: DimseStatus) -> Self {
        Self {
            message_id_being_responded_to,
            command,
            status,
            payload: ResponsePayload::None,
        }
    }

    /// Create a pending C-FIND response carrying one match
    pub fn find_match(message_id: u16, identifier: BTreeMap<String, String>) -> Self {
        Self {
            payload: ResponsePayload::Identifier(identifier),
            ..Self::new(message_id, DimseCommand::Find, DimseStatus::Pending)
        }
    }

    /// Attach sub-operation counters
    pub fn with_sub_operations(mut self, sub_operations: SubOperations) -> Self {
        self.payload = ResponsePayload::SubOperations(sub_operations);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// The identifier attached to this response, if any
    pub fn identifier(&self) -> Option<&BTreeMap<String, String>> {
        match &self.payload {
            ResponsePayload::Identifier(identifier) => Some(identifier),
            _ => None,
        }
    }
}

impl FindQuery {
    /// Create a new patient-level query
    pub fn patient(patient_id: Option<String>) -> Self {
        let mut parameters = HashMap::new();
        if let Some(id) = patient_id {
            parameters.insert("PatientID".to_string(), id);
        }

        Self {
            query_level: QueryLevel::Patient,
            parameters,
            max_results: 0,
        }
    }

    /// Create a new study-level query
    pub fn study(study_instance_uid: Option<String>) -> Self {
        let mut parameters = HashMap::new();
        if let Some(uid) = study_instance_uid {
            parameters.insert("StudyInstanceUID".to_string(), uid);
        }

        Self {
            query_level: QueryLevel::Study,
            parameters,
            max_results: 0,
        }
    }

    /// Create a new image-level query for a single instance
    pub fn image(sop_instance_uid: impl Into<String>) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("SOPInstanceUID".to_string(), sop_instance_uid.into());

        Self {
            query_level: QueryLevel::Image,
            parameters,
            max_results: 0,
        }
    }

    /// Add a query parameter
    pub fn with_parameter(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(tag.into(), value.into());
        self
    }

    /// Set maximum number of results
    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = max;
        self
    }
}

impl MoveQuery {
    /// Create a new move query
    pub fn new(query_level: QueryLevel, destination_aet: impl Into<String>) -> Self {
        Self {
            query_level,
            parameters: HashMap::new(),
            destination_aet: destination_aet.into(),
        }
    }

    /// Add a query parameter
    pub fn with_parameter(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(tag.into(), value.into());
        self
    }
}

impl fmt::Display for QueryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryLevel::Patient => write!(f, "PATIENT"),
            QueryLevel::Study => write!(f, "STUDY"),
            QueryLevel::Series => write!(f, "SERIES"),
            QueryLevel::Image => write!(f, "IMAGE"),
        }
    }
}

impl std::str::FromStr for QueryLevel {
    type Err = crate::error::DimseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PATIENT" => Ok(QueryLevel::Patient),
            "STUDY" => Ok(QueryLevel::Study),
            "SERIES" => Ok(QueryLevel::Series),
            "IMAGE" => Ok(QueryLevel::Image),
            _ => Err(crate::error::DimseError::config(format!(
                "Invalid query level: {}",
                s
            ))),
        }
    }
}
