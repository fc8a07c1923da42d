// libs/conversation-cell/src/services/workflow.rs
use std::cmp::min;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{BookingSummary, ConfirmationNotice, ExportSink, NotificationSender};
use patient_cell::{
    IdentityMatcherService, LookupQuery, PatientRecord, PatientStore, PatientType,
};
use scheduling_cell::{
    ReservationOutcome, ReservationService, ScheduleStore, SlotQuery, SlotSearchService,
};
use shared_config::AppConfig;

use crate::models::{
    BookingRoute, ConversationError, ConversationState, ErrorRoute, MessageRole, PatientInfo,
    PatientInfoRoute, SlotConfirmRoute, SlotSearchRoute, TurnReply, TurnStatus, WorkflowStep,
};
use crate::services::confirmation::ConfirmationService;
use crate::services::extraction::{fields, validate_birth_date, InfoExtractor};
use crate::services::session::SessionStore;

const MAX_RETRIES: u32 = 3;
const SLOTS_SHOWN: usize = 5;
// Upper bound on node executions per turn; a healthy turn never comes close.
const MAX_STEPS_PER_TURN: usize = 30;

enum NodeOutcome {
    Continue,
    Suspend,
}

struct Turn {
    message: String,
    consumed: bool,
    had_error: bool,
}

/// The conversation engine. One inbound message advances the thread's state
/// machine until it either suspends awaiting the next message or reaches a
/// terminal step. Collaborators are injected; the engine holds no globals.
pub struct AppointmentWorkflow {
    matcher: IdentityMatcherService,
    patient_store: Arc<dyn PatientStore>,
    slot_search: SlotSearchService,
    reservations: ReservationService,
    confirmations: ConfirmationService,
    extractor: Arc<dyn InfoExtractor>,
    sender: Arc<dyn NotificationSender>,
    export: Arc<dyn ExportSink>,
    sessions: SessionStore,
    clinic_name: String,
    horizon_days: i64,
}

impl AppointmentWorkflow {
    pub fn new(
        patient_store: Arc<dyn PatientStore>,
        schedule_store: Arc<ScheduleStore>,
        extractor: Arc<dyn InfoExtractor>,
        sender: Arc<dyn NotificationSender>,
        export: Arc<dyn ExportSink>,
        config: &AppConfig,
    ) -> Self {
        Self {
            matcher: IdentityMatcherService::new(patient_store.clone()),
            patient_store,
            slot_search: SlotSearchService::new(schedule_store.clone()),
            reservations: ReservationService::new(schedule_store),
            confirmations: ConfirmationService::new(),
            extractor,
            sender,
            export,
            sessions: SessionStore::new(),
            clinic_name: config.clinic_name.clone(),
            horizon_days: config.search_horizon_days,
        }
    }

    /// Variant with slot-ranking jitter and revenue variation disabled, for
    /// reproducible runs.
    pub fn deterministic(
        patient_store: Arc<dyn PatientStore>,
        schedule_store: Arc<ScheduleStore>,
        extractor: Arc<dyn InfoExtractor>,
        sender: Arc<dyn NotificationSender>,
        export: Arc<dyn ExportSink>,
        config: &AppConfig,
    ) -> Self {
        Self {
            matcher: IdentityMatcherService::new(patient_store.clone()),
            patient_store,
            slot_search: SlotSearchService::without_jitter(schedule_store.clone()),
            reservations: ReservationService::new(schedule_store),
            confirmations: ConfirmationService::without_variation(),
            extractor,
            sender,
            export,
            sessions: SessionStore::new(),
            clinic_name: config.clinic_name.clone(),
            horizon_days: config.search_horizon_days,
        }
    }

    /// Entry point for one turn. Always returns a well-formed reply; node
    /// failures are folded into the error-handling route, never raised.
    pub async fn handle_message(&self, thread_id: &str, user_message: &str) -> TurnReply {
        let mut state = self.sessions.load_or_create(thread_id).await;

        if state.current_step.is_terminal() {
            return TurnReply {
                message: "This conversation has concluded. Please start a new one or call our office for further help.".to_string(),
                status: TurnStatus::Success,
                step: state.current_step,
            };
        }

        let watermark = state.messages.len();
        let trimmed = user_message.trim();
        if !trimmed.is_empty() {
            state.push_user(trimmed);
        }
        let mut turn = Turn {
            message: trimmed.to_string(),
            consumed: false,
            had_error: false,
        };

        let mut executed = 0usize;
        while !state.current_step.is_terminal() {
            executed += 1;
            if executed > MAX_STEPS_PER_TURN {
                warn!(
                    "Thread {} exceeded the per-turn step limit at {}",
                    state.thread_id, state.current_step
                );
                state.error_message = Some("Conversation did not settle".to_string());
                state.current_step = WorkflowStep::HandleError;
            }

            debug!("Thread {} at {}", state.thread_id, state.current_step);
            match self.run_node(&mut state, &mut turn).await {
                Ok(NodeOutcome::Continue) => {}
                Ok(NodeOutcome::Suspend) => break,
                // The one adapter converting unexpected node failures into
                // the error-handling route.
                Err(e) => {
                    warn!("Node {} failed: {}", state.current_step, e);
                    state.error_message = Some(e.to_string());
                    state.current_step = WorkflowStep::HandleError;
                }
            }
        }

        let message = state.messages[watermark..]
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let message = if message.is_empty() {
            "I'm here to help you schedule an appointment. How can I assist you?".to_string()
        } else {
            message
        };

        let status = if turn.had_error
            || matches!(state.current_step, WorkflowStep::Escalated | WorkflowStep::Ended)
        {
            TurnStatus::Error
        } else {
            TurnStatus::Success
        };

        let reply = TurnReply {
            message,
            status,
            step: state.current_step,
        };
        self.sessions.save(state).await;
        reply
    }

    pub async fn state_of(&self, thread_id: &str) -> Option<ConversationState> {
        self.sessions.get(thread_id).await
    }

    async fn run_node(
        &self,
        state: &mut ConversationState,
        turn: &mut Turn,
    ) -> Result<NodeOutcome, ConversationError> {
        match state.current_step {
            WorkflowStep::InitializeSession => self.initialize_session(state),
            WorkflowStep::PatientGreeting => self.patient_greeting(state),
            WorkflowStep::CollectPatientInfo => self.collect_patient_info(state, turn).await,
            WorkflowStep::PatientLookup => self.patient_lookup(state).await,
            WorkflowStep::DetermineAppointmentType => self.determine_appointment_type(state),
            WorkflowStep::FindAvailableSlots => self.find_available_slots(state).await,
            WorkflowStep::PresentSlotOptions => self.present_slot_options(state),
            WorkflowStep::ConfirmSlotSelection => self.confirm_slot_selection(state, turn).await,
            WorkflowStep::CollectInsuranceInfo => self.collect_insurance_info(state, turn).await,
            WorkflowStep::CreateCalendarBooking => self.create_calendar_booking(state).await,
            WorkflowStep::GenerateConfirmation => self.generate_confirmation(state),
            WorkflowStep::SendNotifications => self.send_notifications(state).await,
            WorkflowStep::SetupReminders => self.setup_reminders(state).await,
            WorkflowStep::ExportBookingRecord => self.export_booking_record(state).await,
            WorkflowStep::HandleError => self.handle_error(state, turn),
            WorkflowStep::RequestHumanHelp => self.request_human_help(state, turn),
            WorkflowStep::Completed | WorkflowStep::Escalated | WorkflowStep::Ended => {
                Ok(NodeOutcome::Suspend)
            }
        }
    }

    // --------------------------------------------------------------------------
    // NODES
    // --------------------------------------------------------------------------

    fn initialize_session(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        state.available_slots.clear();
        state.selected_slot = None;
        state.booking_id = None;
        state.reservation = None;
        state.confirmation = None;
        state.reminders.clear();
        state.estimated_revenue = 0.0;
        state.error_message = None;
        state.retry_count = 0;
        state.needs_human_intervention = false;

        let has_system = state
            .messages
            .iter()
            .any(|m| m.role == MessageRole::System);
        if !has_system {
            state.messages.insert(
                0,
                crate::models::ChatMessage::new(
                    MessageRole::System,
                    format!(
                        "You are the appointment scheduling assistant for {}.",
                        self.clinic_name
                    ),
                ),
            );
        }

        state.current_step = WorkflowStep::PatientGreeting;
        Ok(NodeOutcome::Continue)
    }

    fn patient_greeting(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        state.push_assistant(format!(
            "Welcome to {}! I can help you schedule an appointment.",
            self.clinic_name
        ));
        state.current_step = WorkflowStep::CollectPatientInfo;
        Ok(NodeOutcome::Continue)
    }

    async fn collect_patient_info(
        &self,
        state: &mut ConversationState,
        turn: &mut Turn,
    ) -> Result<NodeOutcome, ConversationError> {
        if turn.consumed {
            return Ok(NodeOutcome::Suspend);
        }
        turn.consumed = true;

        let wanted = [
            fields::NAME,
            fields::DATE_OF_BIRTH,
            fields::PHONE,
            fields::EMAIL,
            fields::DOCTOR_PREFERENCE,
        ];
        let mut extraction = self
            .extractor
            .extract(&state.messages, &turn.message, &wanted)
            .await;

        // The oracle is not trusted with dates; re-validate before merging.
        if let Some(dob) = extraction.fields.get(fields::DATE_OF_BIRTH).cloned() {
            match validate_birth_date(&dob) {
                Some(canonical) => {
                    extraction
                        .fields
                        .insert(fields::DATE_OF_BIRTH.to_string(), canonical);
                }
                None => {
                    extraction.fields.remove(fields::DATE_OF_BIRTH);
                }
            }
        }

        let info = &mut state.patient_info;
        PatientInfo::set_if_present(&mut info.name, extraction.fields.get(fields::NAME));
        PatientInfo::set_if_present(
            &mut info.date_of_birth,
            extraction.fields.get(fields::DATE_OF_BIRTH),
        );
        PatientInfo::set_if_present(&mut info.phone, extraction.fields.get(fields::PHONE));
        PatientInfo::set_if_present(&mut info.email, extraction.fields.get(fields::EMAIL));
        PatientInfo::set_if_present(
            &mut info.doctor_preference,
            extraction.fields.get(fields::DOCTOR_PREFERENCE),
        );

        match route_after_patient_info(state) {
            PatientInfoRoute::ContinueToLookup => {
                state.current_step = step_after_patient_info(PatientInfoRoute::ContinueToLookup);
                Ok(NodeOutcome::Continue)
            }
            PatientInfoRoute::NeedMoreInfo => {
                let prompt = match state.patient_info.missing_required().first() {
                    Some(&"name") => "Could I have your full name, please?",
                    Some(&"date_of_birth") => {
                        "Thank you. What is your date of birth? (MM/DD/YYYY)"
                    }
                    _ => "And what's the best phone number to reach you?",
                };
                state.push_assistant(prompt);
                Ok(NodeOutcome::Suspend)
            }
            PatientInfoRoute::HandleError => {
                state.current_step = step_after_patient_info(PatientInfoRoute::HandleError);
                Ok(NodeOutcome::Continue)
            }
        }
    }

    async fn patient_lookup(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        let query = LookupQuery {
            name: state.patient_info.name.clone().unwrap_or_default(),
            date_of_birth: state.patient_info.date_of_birth.clone().unwrap_or_default(),
            phone: state.patient_info.phone.clone(),
        };
        let outcome = self.matcher.classify(&query).await;

        if outcome.is_returning {
            state.patient_type = PatientType::Returning;
            if let Some(record) = outcome.matched_record {
                info!(
                    "Thread {} matched returning patient at confidence {:.1}",
                    state.thread_id, outcome.confidence
                );
                // Fields supplied this conversation win over stored ones.
                state.patient_info.absorb_record(&record);
                if state.insurance.carrier.is_none() {
                    state.insurance.carrier = record.insurance_carrier.clone();
                }
                if state.insurance.member_id.is_none() {
                    state.insurance.member_id = record.member_id.clone();
                }
                if state.insurance.group_number.is_none() {
                    state.insurance.group_number = record.group_number.clone();
                }
                state.matched_record = Some(record);
            }
        } else {
            state.patient_type = PatientType::New;
            let record = PatientRecord {
                id: Uuid::new_v4(),
                name: state.patient_info.name.clone().unwrap_or_default(),
                date_of_birth: state.patient_info.date_of_birth.clone().unwrap_or_default(),
                phone: state.patient_info.phone.clone().unwrap_or_default(),
                email: state.patient_info.email.clone(),
                patient_type: PatientType::New,
                last_visit: None,
                insurance_carrier: None,
                member_id: None,
                group_number: None,
            };
            // History is an optimization; a failed write never blocks the
            // conversation.
            if let Err(e) = self.patient_store.append(record).await {
                warn!("Could not persist new patient record: {}", e);
            }
        }

        state.current_step = WorkflowStep::DetermineAppointmentType;
        Ok(NodeOutcome::Continue)
    }

    fn determine_appointment_type(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        // Unconditional business rule: 60 minutes for new patients, 30 for
        // returning, regardless of doctor or specialty.
        let first_name = state
            .patient_info
            .name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("there")
            .to_string();

        if state.patient_type == PatientType::Returning {
            state.appointment_duration_minutes = 30;
            state.push_assistant(format!(
                "Welcome back, {}! I'll set you up with a 30-minute follow-up visit.",
                first_name
            ));
        } else {
            state.appointment_duration_minutes = 60;
            state.push_assistant(format!(
                "Nice to meet you, {}! As a new patient you'll have a 60-minute consultation.",
                first_name
            ));
        }

        state.current_step = WorkflowStep::FindAvailableSlots;
        Ok(NodeOutcome::Continue)
    }

    async fn find_available_slots(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        let mut query = SlotQuery::new(state.appointment_duration_minutes);
        query.max_days_ahead = self.horizon_days;
        if let Some(preference) = &state.patient_info.doctor_preference {
            query = query.with_preference(preference.clone());
        }

        state.available_slots = self.slot_search.find_slots(&query).await;

        match route_after_slot_search(state) {
            SlotSearchRoute::PresentSlots => {
                state.current_step = step_after_slot_search(SlotSearchRoute::PresentSlots);
                Ok(NodeOutcome::Continue)
            }
            SlotSearchRoute::NoSlotsAvailable => {
                state.error_message = Some(format!(
                    "No appointment slots available in the next {} days",
                    self.horizon_days
                ));
                state.current_step = step_after_slot_search(SlotSearchRoute::NoSlotsAvailable);
                Ok(NodeOutcome::Continue)
            }
            SlotSearchRoute::SystemError => {
                state.current_step = step_after_slot_search(SlotSearchRoute::SystemError);
                Ok(NodeOutcome::Continue)
            }
        }
    }

    fn present_slot_options(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        let shown = min(SLOTS_SHOWN, state.available_slots.len());
        let mut lines = vec!["Here are the best available times:".to_string()];
        for (i, slot) in state.available_slots[..shown].iter().enumerate() {
            lines.push(format!(
                "{}. {} at {} with {} ({})",
                i + 1,
                slot.date.format("%A %m/%d/%Y"),
                slot.start_time.format("%I:%M %p"),
                slot.doctor_name,
                slot.specialty
            ));
        }
        lines.push("Which option works for you? Just reply with the number.".to_string());
        state.push_assistant(lines.join("\n"));

        state.current_step = WorkflowStep::ConfirmSlotSelection;
        Ok(NodeOutcome::Continue)
    }

    async fn confirm_slot_selection(
        &self,
        state: &mut ConversationState,
        turn: &mut Turn,
    ) -> Result<NodeOutcome, ConversationError> {
        if turn.consumed {
            return Ok(NodeOutcome::Suspend);
        }
        turn.consumed = true;

        let extraction = self
            .extractor
            .extract(&state.messages, &turn.message, &[fields::SLOT_CHOICE])
            .await;

        let shown = min(SLOTS_SHOWN, state.available_slots.len());
        if let Some(choice) = extraction
            .fields
            .get(fields::SLOT_CHOICE)
            .and_then(|c| c.parse::<usize>().ok())
        {
            if (1..=shown).contains(&choice) {
                let slot = state.available_slots[choice - 1].clone();
                state.push_assistant(format!(
                    "Great choice! {} at {} with {}.",
                    slot.date.format("%A %m/%d/%Y"),
                    slot.start_time.format("%I:%M %p"),
                    slot.doctor_name
                ));
                state.selected_slot = Some(slot);
            }
        }

        match route_after_slot_confirmation(state) {
            SlotConfirmRoute::ProceedToInsurance => {
                state.current_step =
                    step_after_slot_confirmation(SlotConfirmRoute::ProceedToInsurance);
                Ok(NodeOutcome::Continue)
            }
            SlotConfirmRoute::ChooseDifferentSlot => {
                state.push_assistant(
                    "I didn't catch which slot you'd like. Let me show the options again.",
                );
                state.current_step =
                    step_after_slot_confirmation(SlotConfirmRoute::ChooseDifferentSlot);
                Ok(NodeOutcome::Continue)
            }
            SlotConfirmRoute::HandleError => {
                state.current_step = step_after_slot_confirmation(SlotConfirmRoute::HandleError);
                Ok(NodeOutcome::Continue)
            }
        }
    }

    async fn collect_insurance_info(
        &self,
        state: &mut ConversationState,
        turn: &mut Turn,
    ) -> Result<NodeOutcome, ConversationError> {
        if state.insurance.is_complete() {
            state.current_step = WorkflowStep::CreateCalendarBooking;
            return Ok(NodeOutcome::Continue);
        }

        if turn.consumed {
            state.push_assistant(insurance_prompt(&state.insurance.missing_required()));
            return Ok(NodeOutcome::Suspend);
        }
        turn.consumed = true;

        let wanted = [fields::CARRIER, fields::MEMBER_ID, fields::GROUP_NUMBER];
        let extraction = self
            .extractor
            .extract(&state.messages, &turn.message, &wanted)
            .await;

        PatientInfo::set_if_present(
            &mut state.insurance.carrier,
            extraction.fields.get(fields::CARRIER),
        );
        PatientInfo::set_if_present(
            &mut state.insurance.member_id,
            extraction.fields.get(fields::MEMBER_ID),
        );
        PatientInfo::set_if_present(
            &mut state.insurance.group_number,
            extraction.fields.get(fields::GROUP_NUMBER),
        );

        if state.insurance.is_complete() {
            state.push_assistant("Thank you, I have your insurance details.");
            state.current_step = WorkflowStep::CreateCalendarBooking;
            Ok(NodeOutcome::Continue)
        } else {
            state.push_assistant(insurance_prompt(&state.insurance.missing_required()));
            Ok(NodeOutcome::Suspend)
        }
    }

    async fn create_calendar_booking(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        let slot = state
            .selected_slot
            .clone()
            .ok_or_else(|| ConversationError::BookingError("No slot selected".to_string()))?;
        let patient_name = state.patient_info.name.clone().unwrap_or_default();

        match self.reservations.commit(&slot, &patient_name).await {
            Ok(ReservationOutcome::Confirmed(record)) => {
                state.booking_id = Some(record.reservation_id.clone());
                state.reservation = Some(record);
            }
            Ok(ReservationOutcome::Conflict { reason }) => {
                state.error_message = Some(reason);
                state.selected_slot = None;
            }
            Err(e) => return Err(ConversationError::BookingError(e.to_string())),
        }

        match route_after_booking(state) {
            BookingRoute::BookingSuccess => {
                state.current_step = step_after_booking(BookingRoute::BookingSuccess);
                Ok(NodeOutcome::Continue)
            }
            BookingRoute::BookingFailed => {
                state.current_step = step_after_booking(BookingRoute::BookingFailed);
                Ok(NodeOutcome::Continue)
            }
            BookingRoute::NeedHumanHelp => {
                state.current_step = step_after_booking(BookingRoute::NeedHumanHelp);
                Ok(NodeOutcome::Continue)
            }
        }
    }

    fn generate_confirmation(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        let reservation = state
            .reservation
            .clone()
            .ok_or_else(|| ConversationError::BookingError("No reservation on record".to_string()))?;
        let specialty = state
            .selected_slot
            .as_ref()
            .map(|s| s.specialty.clone())
            .unwrap_or_default();

        let confirmation_id = self.confirmations.generate_confirmation_id();
        state.estimated_revenue = self
            .confirmations
            .estimated_revenue(state.patient_type, &specialty);
        state.reminders = self.confirmations.reminder_schedule(
            &confirmation_id,
            reservation.date,
            reservation.start_time,
        );

        let requires_forms = state.patient_type == PatientType::New;
        let notice = ConfirmationNotice {
            confirmation_id: confirmation_id.clone(),
            booking_id: reservation.reservation_id.clone(),
            patient_name: reservation.patient_name.clone(),
            patient_email: state.patient_info.email.clone(),
            doctor_name: reservation.doctor_name.clone(),
            specialty,
            date: reservation.date,
            start_time: reservation.start_time,
            duration_minutes: reservation.duration_minutes,
            requires_forms,
        };

        let mut lines = vec![
            "You're all set! Here are your appointment details:".to_string(),
            format!("Confirmation number: {}", confirmation_id),
            format!(
                "{} on {} at {} ({} minutes)",
                notice.doctor_name,
                notice.date.format("%A %m/%d/%Y"),
                notice.start_time.format("%I:%M %p"),
                notice.duration_minutes
            ),
        ];
        if let Some(carrier) = &state.insurance.carrier {
            lines.push(format!("Insurance on file: {}", carrier));
        }
        if requires_forms {
            lines.push(
                "Please arrive 15 minutes early to complete your new patient intake forms."
                    .to_string(),
            );
        }
        lines.push("You'll receive reminders before your visit.".to_string());
        state.push_assistant(lines.join("\n"));

        state.confirmation = Some(notice);
        state.current_step = WorkflowStep::SendNotifications;
        Ok(NodeOutcome::Continue)
    }

    async fn send_notifications(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        if let Some(notice) = &state.confirmation {
            if !self.sender.send_confirmation(notice).await {
                warn!(
                    "Confirmation delivery failed for {}; booking stands",
                    notice.confirmation_id
                );
            }
        }
        state.current_step = WorkflowStep::SetupReminders;
        Ok(NodeOutcome::Continue)
    }

    async fn setup_reminders(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        let accepted = self.sender.schedule_reminders(&state.reminders).await;
        debug!(
            "Thread {}: {} of {} reminders scheduled",
            state.thread_id,
            accepted,
            state.reminders.len()
        );
        state.current_step = WorkflowStep::ExportBookingRecord;
        Ok(NodeOutcome::Continue)
    }

    async fn export_booking_record(
        &self,
        state: &mut ConversationState,
    ) -> Result<NodeOutcome, ConversationError> {
        if let (Some(notice), Some(reservation)) = (&state.confirmation, &state.reservation) {
            let summary = BookingSummary {
                confirmation_id: notice.confirmation_id.clone(),
                booking_id: reservation.reservation_id.clone(),
                patient_name: reservation.patient_name.clone(),
                patient_type: state.patient_type.to_string(),
                doctor_name: reservation.doctor_name.clone(),
                specialty: notice.specialty.clone(),
                date: reservation.date,
                start_time: reservation.start_time,
                duration_minutes: reservation.duration_minutes,
                insurance_carrier: state.insurance.carrier.clone(),
                estimated_revenue: state.estimated_revenue,
                recorded_at: chrono::Utc::now(),
            };
            if !self.export.record_completed_booking(&summary).await {
                warn!(
                    "Admin export failed for booking {}; booking stands",
                    reservation.reservation_id
                );
            }
        }
        state.current_step = WorkflowStep::Completed;
        Ok(NodeOutcome::Continue)
    }

    fn handle_error(
        &self,
        state: &mut ConversationState,
        turn: &mut Turn,
    ) -> Result<NodeOutcome, ConversationError> {
        turn.had_error = true;
        state.retry_count += 1;

        let detail = state
            .error_message
            .clone()
            .unwrap_or_else(|| "Something went wrong".to_string());

        match route_error_handling(state) {
            ErrorRoute::Retry => {
                state.push_assistant(format!(
                    "I'm sorry, I ran into a problem: {}. Let's try that again.",
                    detail
                ));
                state.error_message = None;
                state.current_step = step_after_error(ErrorRoute::Retry);
                Ok(NodeOutcome::Continue)
            }
            ErrorRoute::Escalate => {
                state.current_step = step_after_error(ErrorRoute::Escalate);
                Ok(NodeOutcome::Continue)
            }
            ErrorRoute::End => {
                // A committed booking is never retried; close out instead.
                state.push_assistant(
                    "Your appointment itself is booked. For anything else, please call our office.",
                );
                state.current_step = step_after_error(ErrorRoute::End);
                Ok(NodeOutcome::Continue)
            }
        }
    }

    fn request_human_help(
        &self,
        state: &mut ConversationState,
        turn: &mut Turn,
    ) -> Result<NodeOutcome, ConversationError> {
        turn.had_error = true;
        state.needs_human_intervention = true;
        state.push_assistant(
            "I'm sorry for the trouble. I'm connecting you with our scheduling staff, who will take it from here.",
        );
        state.current_step = WorkflowStep::Escalated;
        Ok(NodeOutcome::Continue)
    }
}

fn insurance_prompt(missing: &[&str]) -> String {
    let wanted: Vec<&str> = missing
        .iter()
        .map(|field| match *field {
            "carrier" => "insurance carrier",
            "member_id" => "member ID",
            _ => "group number",
        })
        .collect();
    format!(
        "To finish booking, could you share your {}?",
        wanted.join(", ")
    )
}

// ==============================================================================
// ROUTING PREDICATES
//
// Pure functions of the current state; side effects stay in the nodes.
// ==============================================================================

pub fn route_after_patient_info(state: &ConversationState) -> PatientInfoRoute {
    if state.error_message.is_some() {
        PatientInfoRoute::HandleError
    } else if state.patient_info.missing_required().is_empty() {
        PatientInfoRoute::ContinueToLookup
    } else {
        PatientInfoRoute::NeedMoreInfo
    }
}

pub fn route_after_slot_search(state: &ConversationState) -> SlotSearchRoute {
    if state.error_message.is_some() {
        SlotSearchRoute::SystemError
    } else if !state.available_slots.is_empty() {
        SlotSearchRoute::PresentSlots
    } else {
        SlotSearchRoute::NoSlotsAvailable
    }
}

pub fn route_after_slot_confirmation(state: &ConversationState) -> SlotConfirmRoute {
    if state.error_message.is_some() {
        SlotConfirmRoute::HandleError
    } else if state.selected_slot.is_some() {
        SlotConfirmRoute::ProceedToInsurance
    } else {
        SlotConfirmRoute::ChooseDifferentSlot
    }
}

pub fn route_after_booking(state: &ConversationState) -> BookingRoute {
    if state.needs_human_intervention {
        BookingRoute::NeedHumanHelp
    } else if state.error_message.is_some() {
        BookingRoute::BookingFailed
    } else if state.booking_id.is_some() {
        BookingRoute::BookingSuccess
    } else {
        // Neither signal present reads as failure, never as success.
        BookingRoute::BookingFailed
    }
}

pub fn route_error_handling(state: &ConversationState) -> ErrorRoute {
    if state.retry_count >= MAX_RETRIES || state.needs_human_intervention {
        ErrorRoute::Escalate
    } else if state.booking_id.is_some() {
        ErrorRoute::End
    } else {
        ErrorRoute::Retry
    }
}

// Every route label maps to a concrete next step; the exhaustive matches
// keep that total.

pub fn step_after_patient_info(route: PatientInfoRoute) -> WorkflowStep {
    match route {
        PatientInfoRoute::ContinueToLookup => WorkflowStep::PatientLookup,
        PatientInfoRoute::NeedMoreInfo => WorkflowStep::CollectPatientInfo,
        PatientInfoRoute::HandleError => WorkflowStep::HandleError,
    }
}

pub fn step_after_slot_search(route: SlotSearchRoute) -> WorkflowStep {
    match route {
        SlotSearchRoute::PresentSlots => WorkflowStep::PresentSlotOptions,
        SlotSearchRoute::NoSlotsAvailable => WorkflowStep::HandleError,
        SlotSearchRoute::SystemError => WorkflowStep::HandleError,
    }
}

pub fn step_after_slot_confirmation(route: SlotConfirmRoute) -> WorkflowStep {
    match route {
        SlotConfirmRoute::ProceedToInsurance => WorkflowStep::CollectInsuranceInfo,
        SlotConfirmRoute::ChooseDifferentSlot => WorkflowStep::PresentSlotOptions,
        SlotConfirmRoute::HandleError => WorkflowStep::HandleError,
    }
}

pub fn step_after_booking(route: BookingRoute) -> WorkflowStep {
    match route {
        BookingRoute::BookingSuccess => WorkflowStep::GenerateConfirmation,
        BookingRoute::BookingFailed => WorkflowStep::HandleError,
        BookingRoute::NeedHumanHelp => WorkflowStep::RequestHumanHelp,
    }
}

pub fn step_after_error(route: ErrorRoute) -> WorkflowStep {
    match route {
        ErrorRoute::Retry => WorkflowStep::CollectPatientInfo,
        ErrorRoute::Escalate => WorkflowStep::RequestHumanHelp,
        ErrorRoute::End => WorkflowStep::Ended,
    }
}
