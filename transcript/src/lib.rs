/*
 * Copyright 2026 The powergen developers
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Turns one seed command (usually just `make`) into the flat, ordered list
//! of shell commands the build would run, by forcing dry runs and expanding
//! nested make/cmake invocations recursively.

use std::path::PathBuf;

mod expand;
mod split;
mod which;

pub use expand::{list_commands, ExpandError, MAX_RECURSION_DEPTH};
pub use split::split_commands;
pub use which::WhichCache;

/// One command as the shell would see it, plus the directory it would run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub cwd: PathBuf,
    pub text: String,
}
