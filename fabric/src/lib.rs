// Copyright 2024 Task Fabric Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The three cooperating roles of the task fabric built on
//! [`fabric_transport`]: [`dispatcher::Dispatcher`], [`worker::Worker`] and
//! [`client::Client`], plus per-role configuration and the
//! [`disability::DisabilitySupervisor`] testing aid.

pub mod client;
pub mod config;
pub mod disability;
pub mod dispatcher;
pub mod worker;

pub use client::Client;
pub use dispatcher::Dispatcher;
pub use worker::Worker;
