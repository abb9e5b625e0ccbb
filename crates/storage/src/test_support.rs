// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for storage tests.

use hearth_core::{MemoryLimits, ServerId, ServerType};

use crate::servers::NewServer;

pub(crate) fn sample_server(name: &str, port: u16) -> NewServer {
    NewServer {
        id: ServerId::generate(),
        name: name.to_string(),
        owner_id: "owner-1".to_string(),
        mc_version: "1.20.1".to_string(),
        server_type: ServerType::Vanilla,
        directory_path: format!("/srv/minecraft/{name}"),
        port,
        memory: MemoryLimits::default(),
        max_players: 20,
    }
}
