// libs/conversation-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use notification_cell::{ConfirmationNotice, Reminder};
use patient_cell::{PatientRecord, PatientType};
use scheduling_cell::{ReservationRecord, Slot};

// ==============================================================================
// CONVERSATION LOG
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sent_at: Utc::now(),
        }
    }
}

// ==============================================================================
// COLLECTED PATIENT / INSURANCE FIELDS
// ==============================================================================

/// Fields gathered about the patient over the conversation. Merge policy:
/// non-empty extracted values replace what is held, empty values never clear
/// a field that was already supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientInfo {
    pub name: Option<String>,
    /// Canonical MM/DD/YYYY once validated.
    pub date_of_birth: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub doctor_preference: Option<String>,
}

impl PatientInfo {
    pub fn set_if_present(field: &mut Option<String>, value: Option<&String>) {
        if let Some(value) = value {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                *field = Some(trimmed.to_string());
            }
        }
    }

    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.date_of_birth.is_none() {
            missing.push("date_of_birth");
        }
        if self.phone.is_none() {
            missing.push("phone");
        }
        missing
    }

    /// Folds a matched record's stored fields in underneath what the patient
    /// supplied this conversation. Supplied values win.
    pub fn absorb_record(&mut self, record: &PatientRecord) {
        if self.name.is_none() {
            self.name = Some(record.name.clone());
        }
        if self.date_of_birth.is_none() {
            self.date_of_birth = Some(record.date_of_birth.clone());
        }
        if self.phone.is_none() {
            self.phone = Some(record.phone.clone());
        }
        if self.email.is_none() {
            self.email = record.email.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceInfo {
    pub carrier: Option<String>,
    pub member_id: Option<String>,
    pub group_number: Option<String>,
}

impl InsuranceInfo {
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.carrier.is_none() {
            missing.push("carrier");
        }
        if self.member_id.is_none() {
            missing.push("member_id");
        }
        if self.group_number.is_none() {
            missing.push("group_number");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }
}

// ==============================================================================
// WORKFLOW STEPS AND ROUTES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    InitializeSession,
    PatientGreeting,
    CollectPatientInfo,
    PatientLookup,
    DetermineAppointmentType,
    FindAvailableSlots,
    PresentSlotOptions,
    ConfirmSlotSelection,
    CollectInsuranceInfo,
    CreateCalendarBooking,
    GenerateConfirmation,
    SendNotifications,
    SetupReminders,
    ExportBookingRecord,
    HandleError,
    RequestHumanHelp,
    Completed,
    Escalated,
    Ended,
}

impl WorkflowStep {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStep::Completed | WorkflowStep::Escalated | WorkflowStep::Ended
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::InitializeSession => "initialize_session",
            WorkflowStep::PatientGreeting => "patient_greeting",
            WorkflowStep::CollectPatientInfo => "collect_patient_info",
            WorkflowStep::PatientLookup => "patient_lookup",
            WorkflowStep::DetermineAppointmentType => "determine_appointment_type",
            WorkflowStep::FindAvailableSlots => "find_available_slots",
            WorkflowStep::PresentSlotOptions => "present_slot_options",
            WorkflowStep::ConfirmSlotSelection => "confirm_slot_selection",
            WorkflowStep::CollectInsuranceInfo => "collect_insurance_info",
            WorkflowStep::CreateCalendarBooking => "create_calendar_booking",
            WorkflowStep::GenerateConfirmation => "generate_confirmation",
            WorkflowStep::SendNotifications => "send_notifications",
            WorkflowStep::SetupReminders => "setup_reminders",
            WorkflowStep::ExportBookingRecord => "export_booking_record",
            WorkflowStep::HandleError => "handle_error",
            WorkflowStep::RequestHumanHelp => "request_human_help",
            WorkflowStep::Completed => "completed",
            WorkflowStep::Escalated => "escalated",
            WorkflowStep::Ended => "ended",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One closed route enum per conditional edge keeps every outcome label
/// exhaustively matched when the engine picks the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientInfoRoute {
    ContinueToLookup,
    NeedMoreInfo,
    HandleError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSearchRoute {
    PresentSlots,
    NoSlotsAvailable,
    SystemError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotConfirmRoute {
    ProceedToInsurance,
    ChooseDifferentSlot,
    HandleError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingRoute {
    BookingSuccess,
    BookingFailed,
    NeedHumanHelp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRoute {
    Retry,
    Escalate,
    End,
}

// ==============================================================================
// CONVERSATION STATE
// ==============================================================================

/// Full state of one scheduling conversation, owned exclusively by its
/// thread. Everything a node reads or writes lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    pub current_step: WorkflowStep,
    pub messages: Vec<ChatMessage>,
    pub patient_info: PatientInfo,
    pub insurance: InsuranceInfo,
    pub patient_type: PatientType,
    pub matched_record: Option<PatientRecord>,
    pub appointment_duration_minutes: i64,
    pub available_slots: Vec<Slot>,
    pub selected_slot: Option<Slot>,
    pub booking_id: Option<String>,
    pub reservation: Option<ReservationRecord>,
    pub confirmation: Option<ConfirmationNotice>,
    pub reminders: Vec<Reminder>,
    pub estimated_revenue: f64,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub needs_human_intervention: bool,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            current_step: WorkflowStep::InitializeSession,
            messages: Vec::new(),
            patient_info: PatientInfo::default(),
            insurance: InsuranceInfo::default(),
            patient_type: PatientType::Unknown,
            matched_record: None,
            appointment_duration_minutes: 0,
            available_slots: Vec::new(),
            selected_slot: None,
            booking_id: None,
            reservation: None,
            confirmation: None,
            reminders: Vec::new(),
            estimated_revenue: 0.0,
            error_message: None,
            retry_count: 0,
            needs_human_intervention: false,
        }
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages
            .push(ChatMessage::new(MessageRole::Assistant, content));
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(MessageRole::User, content));
    }
}

// ==============================================================================
// TURN RESULT
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Success,
    Error,
}

/// What the engine hands back for every inbound message. It always carries
/// an outbound message; the caller is never left without a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub message: String,
    pub status: TurnStatus,
    pub step: WorkflowStep,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Scheduling error: {0}")]
    SchedulingError(String),

    #[error("Booking error: {0}")]
    BookingError(String),

    #[error("Session error: {0}")]
    SessionError(String),
}
