// SPDX-License-Identifier: MIT

//! Agent development kit: model abstraction and error types shared by the
//! multi-hop pipeline

pub mod error;
pub mod model;
