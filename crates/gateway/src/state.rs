// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use drover_protocol::redact::Redactor;
use tokio_util::sync::CancellationToken;

use crate::allowlist::Allowlist;
use crate::config::GatewayConfig;
use crate::hub::Hub;
use crate::store::Store;

/// Shared gateway state, passed by reference into every route.
pub struct Gateway {
    pub store: Store,
    pub hub: Hub,
    pub config: GatewayConfig,
    pub redactor: Redactor,
    pub allowlist: Allowlist,
    pub shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(config: GatewayConfig, store: Store, shutdown: CancellationToken) -> Self {
        let redactor = match config.redact_patterns {
            Some(ref raw) => Redactor::with_extra(raw.lines()),
            None => Redactor::new(),
        };
        let allowlist = Allowlist::with_extra(config.extra_allowed_commands.as_deref());
        Self { store, hub: Hub::new(), config, redactor, allowlist, shutdown }
    }
}
