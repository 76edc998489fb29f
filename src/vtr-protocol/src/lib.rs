// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod auth;
pub mod codec;
pub mod mapping;
pub mod types;

pub use types::{ClientEnvelope, ClientResponse, SurfaceCommand};
