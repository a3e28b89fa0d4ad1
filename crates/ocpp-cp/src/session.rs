//! # Session Engine
//!
//! Drives one simulated charge point over a single connection:
//! BootNotification, Authorize, StartTransaction, MeterValues and
//! StopTransaction, answering server-initiated calls along the way.
//!
//! All session state is owned by the task running [`Session::run`]. Transport
//! events, the MeterValues interval, the stop and close deadlines, profile
//! recalculation wake-ups and the shutdown signal are multiplexed with
//! `tokio::select!`; each wake-up is handled to completion before the next.

use crate::error::{ChargePointError, ChargePointResult};
use crate::message_handler::{CallHandler, ConfigurationStore, FollowUp};
use crate::meter::MeterSimulator;
use crate::state_machine::{SessionState, SessionStateMachine, SessionTrigger};
use crate::{LatencyPhase, SessionConfig, SessionEvent};
use chrono::Utc;
use ocpp_messages::utils::extract_response;
use ocpp_messages::v16j::{
    AuthorizeRequest, BootNotificationRequest, MeterValuesRequest, RegistrationStatus,
    StartTransactionRequest, StatusNotificationRequest, StopTransactionRequest,
};
use ocpp_messages::{CallErrorMessage, CallMessage, CallResultMessage, Message, OcppAction};
use ocpp_smart_charging::ChargingProfileStore;
use ocpp_transport::utils::session_url;
use ocpp_transport::{Dialer, Transport, TransportError, TransportEvent};
use ocpp_types::common::Reason;
use ocpp_types::v16j::{ChargePointErrorCode, ChargePointStatus};
use ocpp_types::OcppError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval};
use tracing::{debug, error, info, warn};

/// The simulator always charges on connector 1
pub const CONNECTOR_ID: u32 = ocpp_smart_charging::profile::CHARGING_CONNECTOR;

/// Outcome of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub cp_id: String,
    pub final_state: SessionState,
    pub was_connected: bool,
    pub transaction_id: Option<i32>,
    /// Errors counted during the session, recoverable ones included
    pub errors: u32,
    pub energy_wh: f64,
    /// Error that ended the session, if any
    pub failure: Option<ChargePointError>,
}

/// A simulated charge point that has not been started yet
pub struct Session {
    cp_id: String,
    id_tag: String,
    config: SessionConfig,
    dialer: Arc<dyn Dialer>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    shutdown: Option<watch::Receiver<bool>>,
    store: ChargingProfileStore,
    meter_seed: Option<u64>,
}

impl Session {
    pub fn new(
        cp_id: impl Into<String>,
        id_tag: impl Into<String>,
        config: SessionConfig,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let mut store = ChargingProfileStore::new(config.connector);
        store.configure_connector(CONNECTOR_ID, config.connector);
        Self {
            cp_id: cp_id.into(),
            id_tag: id_tag.into(),
            config,
            dialer,
            events: None,
            shutdown: None,
            store,
            meter_seed: None,
        }
    }

    /// Report progress on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop gracefully once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Use a deterministic meter
    pub fn with_meter_seed(mut self, seed: u64) -> Self {
        self.meter_seed = Some(seed);
        self
    }

    pub fn cp_id(&self) -> &str {
        &self.cp_id
    }

    /// Effective smart-charging limits in W per connector, updated whenever
    /// they change
    pub fn subscribe_limits(&self) -> watch::Receiver<BTreeMap<u32, f64>> {
        self.store.subscribe()
    }

    /// Run the session to a terminal state
    pub async fn run(self) -> SessionReport {
        let Session {
            cp_id,
            id_tag,
            config,
            dialer,
            events,
            mut shutdown,
            store,
            meter_seed,
        } = self;

        emit(
            &events,
            SessionEvent::Launched {
                cp_id: cp_id.clone(),
            },
        );
        let mut machine = SessionStateMachine::new();
        let _ = machine.transition(SessionTrigger::Open);

        let url = session_url(&config.base_url, &cp_id, config.append_cp_id);
        info!("[{}] Connecting to {}", cp_id, url);

        let connection = match dialer.dial(&url).await {
            Ok(connection) => connection,
            Err(e) => {
                let err = ChargePointError::from(e);
                error!("[{}] {}", cp_id, err);
                let _ = machine.transition(SessionTrigger::Failed {
                    reason: err.to_string(),
                });
                emit(
                    &events,
                    SessionEvent::Error {
                        cp_id: cp_id.clone(),
                        category: err.category(),
                    },
                );
                emit(
                    &events,
                    SessionEvent::Finished {
                        cp_id: cp_id.clone(),
                        state: machine.current_state(),
                        was_connected: false,
                    },
                );
                return SessionReport {
                    cp_id,
                    final_state: machine.current_state(),
                    was_connected: false,
                    transaction_id: None,
                    errors: 1,
                    energy_wh: 0.0,
                    failure: Some(err),
                };
            }
        };

        let _ = machine.transition(SessionTrigger::TransportOpened);
        info!("[{}] Connected ({})", cp_id, connection.info.id);

        let meter = match meter_seed {
            Some(seed) => MeterSimulator::seeded(config.nominal_power_w, seed),
            None => MeterSimulator::new(config.nominal_power_w),
        };
        let handler = CallHandler::new(
            ConfigurationStore::new(config.meter_interval_secs),
            config.close_delay(),
        );
        let mut transport_events = connection.events;

        let mut driver = Driver {
            cp_id,
            id_tag,
            config,
            transport: connection.transport,
            machine,
            store,
            handler,
            meter,
            events,
            pending: HashMap::new(),
            seq: 0,
            start_requested: false,
            started_once: false,
            stop_scheduled: false,
            stop_sent: false,
            transaction_id: None,
            meter_timer: None,
            stop_at: None,
            close_at: None,
            consecutive_errors: HashMap::new(),
            errors: 0,
            failure: None,
        };
        driver.emit(SessionEvent::Connected {
            cp_id: driver.cp_id.clone(),
        });

        if let Err(e) = driver.boot().await {
            driver.fail(e).await;
        }

        while !driver.machine.current_state().is_terminal() {
            let stop_at = driver.stop_at;
            let close_at = driver.close_at;
            let watchdog_at = driver.watchdog_deadline();

            let wake = tokio::select! {
                event = transport_events.recv() => match event {
                    Some(TransportEvent::Message(text)) => Wake::Frame(text),
                    Some(TransportEvent::Closed { reason }) => Wake::Closed(reason),
                    Some(TransportEvent::Error(e)) => Wake::TransportFailed(e),
                    None => Wake::Closed("transport dropped".to_string()),
                },
                _ = tick(&mut driver.meter_timer) => Wake::MeterTick,
                _ = sleep_until_opt(stop_at) => Wake::StopDue,
                _ = sleep_until_opt(close_at) => Wake::CloseDue,
                Some(connector) = driver.store.next_recalc() => Wake::Recalc(connector),
                _ = shutdown_requested(&mut shutdown) => Wake::Shutdown,
                _ = sleep_until_opt(watchdog_at) => Wake::Watchdog,
            };

            driver.handle(wake).await;
        }

        driver.finish()
    }
}

enum Wake {
    Frame(String),
    Closed(String),
    TransportFailed(TransportError),
    MeterTick,
    StopDue,
    CloseDue,
    Recalc(u32),
    Shutdown,
    Watchdog,
}

#[derive(Debug)]
struct PendingCall {
    action: String,
    payload: Value,
    sent_at: Instant,
}

/// Live state of a connected session
struct Driver {
    cp_id: String,
    id_tag: String,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    machine: SessionStateMachine,
    store: ChargingProfileStore,
    handler: CallHandler,
    meter: MeterSimulator,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    pending: HashMap<String, PendingCall>,
    seq: u64,
    start_requested: bool,
    started_once: bool,
    stop_scheduled: bool,
    stop_sent: bool,
    transaction_id: Option<i32>,
    meter_timer: Option<Interval>,
    stop_at: Option<Instant>,
    close_at: Option<Instant>,
    consecutive_errors: HashMap<String, u32>,
    errors: u32,
    failure: Option<ChargePointError>,
}

impl Driver {
    async fn handle(&mut self, wake: Wake) {
        let result = match wake {
            Wake::Frame(text) => self.on_frame(text).await,
            Wake::Closed(reason) => {
                info!("[{}] Connection closed: {}", self.cp_id, reason);
                self.enter_closed();
                Ok(())
            }
            Wake::TransportFailed(e) => Err(e.into()),
            Wake::MeterTick => self.send_meter_values().await,
            Wake::StopDue => {
                self.stop_at = None;
                self.maybe_stop().await
            }
            Wake::CloseDue => {
                self.close_at = None;
                self.close().await;
                Ok(())
            }
            Wake::Recalc(connector) => {
                if let Some(limit) = self.store.recalculate(connector, Utc::now()) {
                    debug!(
                        "[{}] Connector {} limit now {:.0} W",
                        self.cp_id, connector, limit.limit_w
                    );
                }
                Ok(())
            }
            Wake::Shutdown => self.shutdown().await,
            Wake::Watchdog => self.check_watchdog(),
        };

        if let Err(e) = result {
            self.fail(e).await;
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn next_message_id(&mut self) -> String {
        self.seq += 1;
        format!("{}-{}-{}", self.cp_id, Utc::now().timestamp_millis(), self.seq)
    }

    async fn send_call<T: OcppAction>(&mut self, request: &T) -> ChargePointResult<String> {
        request.validate()?;
        let payload = serde_json::to_value(request).map_err(OcppError::from)?;
        self.send_frame(T::ACTION_NAME, payload).await
    }

    async fn send_frame(&mut self, action: &str, payload: Value) -> ChargePointResult<String> {
        let unique_id = self.next_message_id();
        let text = Message::call(unique_id.clone(), action, payload.clone())?.encode()?;

        if self.config.debug_payloads {
            debug!("[{}] -> {}", self.cp_id, text);
        } else {
            debug!("[{}] -> {} ({})", self.cp_id, action, unique_id);
        }
        self.transport.send_text(text).await?;

        self.pending.insert(
            unique_id.clone(),
            PendingCall {
                action: action.to_string(),
                payload,
                sent_at: Instant::now(),
            },
        );
        Ok(unique_id)
    }

    async fn send_status(&mut self, status: ChargePointStatus) -> ChargePointResult<()> {
        if !self.config.status_notifications {
            return Ok(());
        }
        let request = StatusNotificationRequest {
            connector_id: CONNECTOR_ID,
            error_code: ChargePointErrorCode::NoError,
            status,
            timestamp: Some(Utc::now()),
            info: None,
        };
        self.send_call(&request).await.map(|_| ())
    }

    async fn boot(&mut self) -> ChargePointResult<()> {
        let boot = &self.config.boot;
        let request = BootNotificationRequest {
            charge_point_vendor: boot.vendor.clone(),
            charge_point_model: boot.model.clone(),
            charge_point_serial_number: Some(self.cp_id.clone()),
            charge_box_serial_number: Some(self.cp_id.clone()),
            firmware_version: Some(boot.firmware_version.clone()),
            meter_type: Some(boot.meter_type.clone()),
            meter_serial_number: Some(format!("METER-{}", self.cp_id)),
        };
        self.send_call(&request).await?;
        self.transition(SessionTrigger::BootSent)
    }

    async fn authorize(&mut self) -> ChargePointResult<()> {
        let request = AuthorizeRequest {
            id_tag: self.id_tag.clone(),
        };
        self.send_call(&request).await?;
        self.transition(SessionTrigger::AuthorizeSent)
    }

    async fn maybe_start(&mut self) -> ChargePointResult<()> {
        if self.config.no_start {
            info!("[{}] StartTransaction disabled, staying idle", self.cp_id);
            return Ok(());
        }
        if self.start_requested {
            return Ok(());
        }
        self.start_requested = true;

        let request = StartTransactionRequest {
            connector_id: CONNECTOR_ID,
            id_tag: self.id_tag.clone(),
            meter_start: self.meter.register_wh(),
            timestamp: Utc::now(),
            reservation_id: None,
        };
        self.send_call(&request).await?;
        self.transition(SessionTrigger::StartSent)
    }

    /// Timers that run while the transaction is open
    fn after_start(&mut self) {
        if let Some(period) = self.config.meter_interval() {
            self.meter_timer = Some(interval_at(Instant::now() + period, period));
        }
        if !self.config.no_stop && !self.stop_scheduled {
            self.stop_scheduled = true;
            self.stop_at = Some(Instant::now() + self.config.hold());
        }
    }

    async fn send_meter_values(&mut self) -> ChargePointResult<()> {
        let Some(transaction_id) = self.transaction_id else {
            return Ok(());
        };
        if self.stop_sent {
            return Ok(());
        }

        let limit_w = self.store.current_limit_w(CONNECTOR_ID, Utc::now());
        let reading = self
            .meter
            .sample(self.config.meter_interval_secs as f64, limit_w);
        let request = MeterValuesRequest {
            connector_id: CONNECTOR_ID,
            transaction_id: Some(transaction_id),
            meter_values: vec![reading.to_meter_value()],
        };
        self.send_call(&request).await.map(|_| ())
    }

    async fn maybe_stop(&mut self) -> ChargePointResult<()> {
        if self.stop_sent {
            return Ok(());
        }
        let Some(transaction_id) = self.transaction_id else {
            return Ok(());
        };
        self.stop_sent = true;
        self.meter_timer = None;
        self.stop_at = None;

        let request = StopTransactionRequest {
            id_tag: Some(self.id_tag.clone()),
            meter_stop: self.meter.register_wh(),
            timestamp: Utc::now(),
            transaction_id,
            reason: Some(Reason::Local),
        };
        self.send_call(&request).await?;
        self.transition(SessionTrigger::StopSent)
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    async fn on_frame(&mut self, text: String) -> ChargePointResult<()> {
        if self.config.debug_payloads {
            debug!("[{}] <- {}", self.cp_id, text);
        }
        let message = match Message::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("[{}] Dropping malformed frame: {}", self.cp_id, e);
                return Ok(());
            }
        };

        match message {
            Message::Call(call) => self.on_call(call).await,
            Message::CallResult(result) => self.on_result(result).await,
            Message::CallError(err) => self.on_call_error(err).await,
        }
    }

    async fn on_call(&mut self, call: CallMessage) -> ChargePointResult<()> {
        debug!("[{}] <- {} ({})", self.cp_id, call.action, call.unique_id);
        let handled = self.handler.handle(&call, &mut self.store, Utc::now());
        let text = handled.response.encode()?;
        self.transport.send_text(text).await?;

        if let Some(FollowUp::CloseAfter(delay)) = handled.follow_up {
            self.schedule_close(delay);
        }
        Ok(())
    }

    async fn on_result(&mut self, result: CallResultMessage) -> ChargePointResult<()> {
        let Some(pending) = self.pending.remove(&result.unique_id) else {
            debug!(
                "[{}] Ignoring result for unknown or answered id {}",
                self.cp_id, result.unique_id
            );
            return Ok(());
        };
        debug!("[{}] <- {} result", self.cp_id, pending.action);
        self.consecutive_errors.remove(&pending.action);

        if let Some(phase) = LatencyPhase::for_action(&pending.action) {
            let millis = pending.sent_at.elapsed().as_millis() as u64;
            self.emit(SessionEvent::Latency { phase, millis });
        }

        match pending.action.as_str() {
            BootNotificationRequest::ACTION_NAME => self.on_boot_result(&result).await,
            AuthorizeRequest::ACTION_NAME => self.on_authorize_result(&result).await,
            StartTransactionRequest::ACTION_NAME => self.on_start_result(&result).await,
            StopTransactionRequest::ACTION_NAME => self.on_stop_result(&result).await,
            _ => Ok(()),
        }
    }

    async fn on_boot_result(&mut self, result: &CallResultMessage) -> ChargePointResult<()> {
        let response = extract_response::<BootNotificationRequest>(result)?;
        if response.status != RegistrationStatus::Accepted {
            return Err(ChargePointError::boot_rejected(format!("{:?}", response.status)));
        }
        info!(
            "[{}] Boot accepted (heartbeat {}s)",
            self.cp_id, response.interval
        );
        self.transition(SessionTrigger::BootAccepted)?;
        self.send_status(ChargePointStatus::Available).await?;

        if self.config.no_auth {
            self.maybe_start().await
        } else {
            self.authorize().await
        }
    }

    async fn on_authorize_result(&mut self, result: &CallResultMessage) -> ChargePointResult<()> {
        let response = extract_response::<AuthorizeRequest>(result)?;
        if !response.id_tag_info.is_accepted() {
            let err = ChargePointError::authorization_failed(
                self.id_tag.clone(),
                format!("{:?}", response.id_tag_info.status),
            );
            self.report_error(&err);
            return self.transition(SessionTrigger::AuthorizeRejected);
        }
        self.transition(SessionTrigger::AuthorizeAccepted)?;
        self.maybe_start().await
    }

    async fn on_start_result(&mut self, result: &CallResultMessage) -> ChargePointResult<()> {
        let response = extract_response::<StartTransactionRequest>(result)?;
        if self.started_once {
            debug!("[{}] Transaction already started, ignoring result", self.cp_id);
            return Ok(());
        }

        let refused = response
            .id_tag_info
            .as_ref()
            .map_or(false, |info| !info.is_accepted());
        let transaction_id = match response.transaction_id {
            Some(id) if !refused => id,
            Some(id) => {
                return Err(ChargePointError::transaction_rejected(format!(
                    "transaction {} refused for {}",
                    id, self.id_tag
                )))
            }
            None => {
                return Err(ChargePointError::transaction_rejected(
                    "no transactionId in response",
                ))
            }
        };

        self.started_once = true;
        self.transaction_id = Some(transaction_id);
        self.transition(SessionTrigger::StartAccepted)?;
        self.store.mark_transaction_start(CONNECTOR_ID, Utc::now());
        info!("[{}] Transaction {} started", self.cp_id, transaction_id);
        self.emit(SessionEvent::TransactionStarted {
            cp_id: self.cp_id.clone(),
            transaction_id,
        });

        self.send_status(ChargePointStatus::Charging).await?;
        self.after_start();
        Ok(())
    }

    async fn on_stop_result(&mut self, result: &CallResultMessage) -> ChargePointResult<()> {
        extract_response::<StopTransactionRequest>(result)?;
        self.transition(SessionTrigger::StopConfirmed)?;
        self.store.mark_transaction_stop(CONNECTOR_ID, Utc::now());
        info!(
            "[{}] Transaction {:?} stopped at {} Wh",
            self.cp_id,
            self.transaction_id,
            self.meter.register_wh()
        );

        self.send_status(ChargePointStatus::Finishing).await?;
        self.schedule_close(self.config.close_delay());
        Ok(())
    }

    async fn on_call_error(&mut self, err: CallErrorMessage) -> ChargePointResult<()> {
        let Some(pending) = self.pending.remove(&err.unique_id) else {
            debug!(
                "[{}] Ignoring CallError for unknown id {}",
                self.cp_id, err.unique_id
            );
            return Ok(());
        };

        let error = ChargePointError::call_error(
            pending.action.clone(),
            err.raw_error_code.clone(),
            err.error_description.clone(),
        );
        let count = self
            .consecutive_errors
            .entry(pending.action.clone())
            .or_insert(0);
        *count += 1;
        if *count >= self.config.max_call_errors {
            return Err(error);
        }
        self.report_error(&error);

        if LatencyPhase::for_action(&pending.action).is_some() {
            info!("[{}] Retrying {}", self.cp_id, pending.action);
            self.send_frame(&pending.action, pending.payload).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn transition(&mut self, trigger: SessionTrigger) -> ChargePointResult<()> {
        self.machine.transition(trigger).map(|_| ())
    }

    fn schedule_close(&mut self, delay: Duration) {
        if self.close_at.is_none() {
            self.close_at = Some(Instant::now() + delay);
        }
    }

    fn watchdog_deadline(&self) -> Option<Instant> {
        let timeout = self.config.response_timeout()?;
        self.pending
            .values()
            .map(|pending| pending.sent_at + timeout)
            .min()
    }

    fn check_watchdog(&self) -> ChargePointResult<()> {
        let Some(timeout) = self.config.response_timeout() else {
            return Ok(());
        };
        let now = Instant::now();
        match self
            .pending
            .values()
            .filter(|pending| pending.sent_at + timeout <= now)
            .min_by_key(|pending| pending.sent_at)
        {
            Some(pending) => Err(ChargePointError::timeout(
                pending.action.clone(),
                timeout.as_millis() as u64,
            )),
            None => Ok(()),
        }
    }

    async fn shutdown(&mut self) -> ChargePointResult<()> {
        info!("[{}] Shutdown requested", self.cp_id);
        if self.machine.current_state() == SessionState::Charging {
            if let Err(e) = self.maybe_stop().await {
                warn!("[{}] Could not send StopTransaction: {}", self.cp_id, e);
            }
        }
        self.close().await;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.close().await {
            debug!("[{}] Close failed: {}", self.cp_id, e);
        }
        self.enter_closed();
    }

    fn enter_closed(&mut self) {
        self.meter_timer = None;
        self.stop_at = None;
        self.close_at = None;
        if !self.machine.current_state().is_terminal() {
            let _ = self.transition(SessionTrigger::Closed);
        }
    }

    fn report_error(&mut self, err: &ChargePointError) {
        self.errors += 1;
        if err.is_recoverable() {
            warn!("[{}] {}", self.cp_id, err);
        } else {
            error!("[{}] {}", self.cp_id, err);
        }
        self.emit(SessionEvent::Error {
            cp_id: self.cp_id.clone(),
            category: err.category(),
        });
    }

    /// Count `err`, move to Error and close the connection
    async fn fail(&mut self, err: ChargePointError) {
        self.report_error(&err);
        self.meter_timer = None;
        self.stop_at = None;
        self.close_at = None;
        let _ = self.transition(SessionTrigger::Failed {
            reason: err.to_string(),
        });
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        if let Err(e) = self.transport.close().await {
            debug!("[{}] Close failed: {}", self.cp_id, e);
        }
    }

    fn emit(&self, event: SessionEvent) {
        emit(&self.events, event);
    }

    fn finish(mut self) -> SessionReport {
        self.store.reset();
        let final_state = self.machine.current_state();
        info!(
            "[{}] Session finished in state {} ({} errors)",
            self.cp_id, final_state, self.errors
        );
        self.emit(SessionEvent::Finished {
            cp_id: self.cp_id.clone(),
            state: final_state,
            was_connected: true,
        });

        SessionReport {
            cp_id: self.cp_id,
            final_state,
            was_connected: true,
            transaction_id: self.transaction_id,
            errors: self.errors,
            energy_wh: self.meter.energy_wh(),
            failure: self.failure,
        }
    }
}

fn emit(events: &Option<mpsc::UnboundedSender<SessionEvent>>, event: SessionEvent) {
    if let Some(tx) = events {
        // Receiver gone means nobody is aggregating any more.
        let _ = tx.send(event);
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolves once the flag turns true; never if there is no signal or its
/// sender is gone
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };
    let requested = rx.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
