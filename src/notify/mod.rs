// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Notifications and the background workers that produce them.

pub mod consumer;
pub mod notification;
pub mod reconciler;
pub mod supervisor;
pub mod webhook;

pub use consumer::{ConsumerConfig, NotificationConsumer};
pub use notification::{Notification, NotificationStore};
pub use reconciler::Reconciler;
pub use supervisor::spawn_supervised;
pub use webhook::{DeliveryError, HttpWebhookSink, NoopWebhookSink, WebhookSink};
