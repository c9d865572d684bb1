// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! RESP (REdis Serialization Protocol v2) wire codec.

pub mod decode;
pub mod encode;

pub use decode::{try_parse_command, Decoded};
pub use encode::Reply;
