// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted gateway stub shared by the sync-engine test modules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use zapdesk_core::types::{
    CreatedInstance, GatewayHealth, GatewaySession, GatewayState, QrPoll,
};
use zapdesk_core::{GatewayApi, ZapdeskError};

/// Outcome of the next `create_instance` call.
pub(crate) enum CreateScript {
    Succeed {
        gateway_instance_id: String,
        qr_code: Option<String>,
    },
    Unreachable,
    Rejected,
}

/// Outcome of the next `get_connection_state` call.
pub(crate) enum StateScript {
    State(GatewayState),
    Unreachable,
}

/// Deterministic [`GatewayApi`] implementation driven by scripted queues.
///
/// Scripted entries are consumed in order; when a queue runs dry the stub
/// falls back to defaults (`create` succeeds, state is `default_state`).
pub(crate) struct ScriptedGateway {
    pub create_script: Mutex<VecDeque<CreateScript>>,
    pub states: Mutex<VecDeque<StateScript>>,
    pub default_state: Mutex<GatewayState>,
    pub qr: Mutex<QrPoll>,
    pub sessions: Mutex<Vec<GatewaySession>>,
    pub created_names: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub status_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        ScriptedGateway {
            create_script: Mutex::new(VecDeque::new()),
            states: Mutex::new(VecDeque::new()),
            default_state: Mutex::new(GatewayState::Connecting),
            qr: Mutex::new(QrPoll {
                qr_code: None,
                waiting: true,
            }),
            sessions: Mutex::new(Vec::new()),
            created_names: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn script_create(&self, script: CreateScript) {
        self.create_script.lock().unwrap().push_back(script);
    }

    pub fn script_states(&self, states: impl IntoIterator<Item = StateScript>) {
        self.states.lock().unwrap().extend(states);
    }

    pub fn set_default_state(&self, state: GatewayState) {
        *self.default_state.lock().unwrap() = state;
    }

    pub fn set_qr(&self, qr_code: Option<&str>) {
        *self.qr.lock().unwrap() = QrPoll {
            qr_code: qr_code.map(str::to_string),
            waiting: qr_code.is_none(),
        };
    }

    pub fn add_session(&self, gateway_instance_id: &str, phone: Option<&str>, status: &str) {
        self.sessions.lock().unwrap().push(GatewaySession {
            gateway_instance_id: gateway_instance_id.to_string(),
            phone: phone.map(str::to_string),
            status: status.to_string(),
            name: None,
        });
    }

    fn unreachable() -> ZapdeskError {
        ZapdeskError::GatewayUnreachable {
            message: "scripted outage".into(),
            source: None,
        }
    }
}

#[async_trait]
impl GatewayApi for ScriptedGateway {
    async fn check_health(&self) -> Result<GatewayHealth, ZapdeskError> {
        Ok(GatewayHealth {
            online: true,
            latency_ms: 1,
            version: None,
        })
    }

    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, ZapdeskError> {
        self.created_names.lock().unwrap().push(name.to_string());
        let script = self.create_script.lock().unwrap().pop_front();
        match script {
            None => Ok(CreatedInstance {
                gateway_instance_id: format!("gw-{name}"),
                qr_code: None,
            }),
            Some(CreateScript::Succeed {
                gateway_instance_id,
                qr_code,
            }) => Ok(CreatedInstance {
                gateway_instance_id,
                qr_code,
            }),
            Some(CreateScript::Unreachable) => Err(Self::unreachable()),
            Some(CreateScript::Rejected) => Err(ZapdeskError::GatewayRejected {
                status: 422,
                message: "scripted rejection".into(),
            }),
        }
    }

    async fn get_connection_state(
        &self,
        _gateway_instance_id: &str,
    ) -> Result<GatewayState, ZapdeskError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.states.lock().unwrap().pop_front();
        match script {
            Some(StateScript::State(state)) => Ok(state),
            Some(StateScript::Unreachable) => Err(Self::unreachable()),
            None => Ok(*self.default_state.lock().unwrap()),
        }
    }

    async fn get_qr_code(&self, _gateway_instance_id: &str) -> Result<QrPoll, ZapdeskError> {
        Ok(self.qr.lock().unwrap().clone())
    }

    async fn list_instances(&self) -> Result<Vec<GatewaySession>, ZapdeskError> {
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn delete_instance(&self, gateway_instance_id: &str) -> Result<(), ZapdeskError> {
        self.deleted
            .lock()
            .unwrap()
            .push(gateway_instance_id.to_string());
        Ok(())
    }
}
