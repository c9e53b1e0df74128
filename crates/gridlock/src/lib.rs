#![doc = include_str!("../../../README.md")]
#![expect(clippy::unnecessary_wraps, reason = "builtin dispatch signatures are uniform")]
#![expect(clippy::needless_pass_by_value, reason = "call APIs pass values consistently")]

mod builtins;
mod exception;
mod expressions;
mod host;
mod interp;
mod intrinsics;
mod io;
mod lexer;
mod object;
mod parse;
mod resource;
mod run;
mod value;

pub mod document;
pub mod ledger;
pub mod sheet_ids;
pub mod tool;
pub mod tracker;

pub use crate::{
    document::{MemoryWorkbook, WorkbookError, excel_constants},
    exception::{CodeLoc, ExcType, Exception},
    host::{HostBridge, HostDocument, HostError, NoHost, ProxyId},
    intrinsics::{BLOCKED_PROPERTIES, DENIED_GLOBALS, Intrinsics, is_locked_down, lockdown},
    io::{CollectConsole, ConsoleLevel, ConsoleWriter, NoConsole, StdConsole, TracingConsole},
    ledger::DirtyRange,
    object::Object,
    resource::{
        DEFAULT_MAX_MEMORY, DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, MAX_DATA_RECURSION_DEPTH, NoLimitTracker,
        ResourceError, ResourceLimits, ResourceTracker,
    },
    run::{Runner, evaluate},
    sheet_ids::{FileSettings, MemorySettings, SettingsStore, StableIdMapper, StoreError},
    tool::{ToolConfig, ToolError, ToolOutcome, execute},
    tracker::TrackedContext,
};
