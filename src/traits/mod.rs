// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod language;
pub mod platform;
pub mod recorder;

pub use language::{LanguageDriver, LanguageOptions};
pub use platform::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};
pub use recorder::{LineageRecorder, VertexAttributes};
