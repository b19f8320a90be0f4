// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tf-adapters: The boundary with the LLM agent SDK.
//!
//! The engine never talks to a concrete SDK; it drives [`AgentSdk`] /
//! [`SdkConversation`] and consumes [`SdkEvent`]s over a channel. Tool
//! callbacks flow the other way through the [`Toolbox`] handle, which
//! the SDK holds so its `task_complete` / `save_plan` /
//! `attach_task_file` tools can reach back into exactly one session.

pub mod sdk;
pub mod toolbox;

pub use sdk::{
    AgentSdk, ContextUsage, ConversationRequest, MessageRole, SdkConversation, SdkError, SdkEvent,
    StopReason,
};
pub use toolbox::{
    AttachFileArgs, CallbackGuard, SavePlanArgs, ToolResult, Toolbox,
};

pub use sdk::process::{ProcessSdk, ProcessSdkConfig};

#[cfg(any(test, feature = "test-support"))]
pub use sdk::fake::{FakeConversation, FakeSdk, FakeTurn, SdkCall, TurnItem};
