// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared fakes for the service manager integration tests.

pub mod helpers;
pub mod mocks;
