use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::exception::{ExcType, Exception, RunError};

/// Recommended maximum call depth if not otherwise specified.
///
/// The evaluator walks the syntax tree recursively, so every snippet call costs several native
/// frames. Debug builds use far larger frames, hence the lower value there.
#[cfg(not(debug_assertions))]
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 200;
/// Recommended maximum call depth if not otherwise specified.
#[cfg(debug_assertions)]
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 24;

/// Maximum nesting depth for data traversal (display, JSON conversion, equality).
///
/// Protects against stack overflow on deeply nested but acyclic arrays and objects, and stops
/// traversal of cyclic ones.
pub const MAX_DATA_RECURSION_DEPTH: usize = 64;

/// Largest single allocation a snippet may request when no memory limit is configured.
///
/// Growing an array through `length` or a far index, or padding a string, asks for the whole
/// buffer up front. Without a ceiling a one-line snippet could abort the host process.
pub const DEFAULT_MAX_MEMORY: usize = 1 << 29;

/// Error returned when a resource limit is exceeded during execution.
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Maximum evaluation steps exceeded.
    Operation { limit: usize, count: usize },
    /// Maximum execution time exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// Maximum call depth exceeded.
    Recursion { limit: usize, depth: usize },
    /// A single allocation would exceed the memory limit.
    Memory { limit: usize, used: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} > {limit}")
            }
            Self::Time { limit, elapsed } => {
                write!(f, "time limit exceeded: {elapsed:?} > {limit:?}")
            }
            Self::Recursion { .. } => f.write_str("Maximum call stack size exceeded"),
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for RunError {
    /// Call-depth and memory overflow are catchable, matching what snippet authors expect from a
    /// `RangeError`. Operation and time exhaustion are not, so a snippet cannot outlive its budget
    /// by catching the error in a loop.
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Recursion { .. } | ResourceError::Memory { .. } => Self::range_error(err.to_string()),
            ResourceError::Operation { .. } | ResourceError::Time { .. } => {
                Self::Uncatchable(Exception::new(ExcType::TimeoutError, err.to_string()))
            }
        }
    }
}

/// Trait for tracking resource usage during one evaluation.
pub trait ResourceTracker: fmt::Debug {
    /// Called at every statement and loop iteration.
    ///
    /// Returns `Ok(())` if within configured limits, or a `ResourceError` if the operation or
    /// time budget is exhausted.
    fn check_time(&mut self) -> Result<(), ResourceError>;

    /// Called before entering a function body.
    ///
    /// # Arguments
    /// * `current_depth` - Current call depth (before the new frame is entered)
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Called before an operation that allocates a buffer sized by snippet input.
    ///
    /// # Arguments
    /// * `estimated_bytes` - Size of the buffer about to be allocated
    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError>;
}

fn check_memory(limit: usize, estimated_bytes: usize) -> Result<(), ResourceError> {
    if estimated_bytes > limit {
        return Err(ResourceError::Memory {
            limit,
            used: estimated_bytes,
        });
    }
    Ok(())
}

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::new()` for the default call-depth limit only, or build custom limits
/// with the builder pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of evaluation steps (statements and loop iterations).
    pub max_operations: Option<usize>,
    /// Maximum execution time.
    pub max_duration: Option<Duration>,
    /// Maximum call depth.
    pub max_recursion_depth: Option<usize>,
    /// Maximum size of a single allocation in bytes. `None` uses [`DEFAULT_MAX_MEMORY`].
    #[serde(default)]
    pub max_memory: Option<usize>,
}

impl ResourceLimits {
    /// Creates limits with everything disabled except call depth, which uses the default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            ..Default::default()
        }
    }

    /// Sets the maximum number of evaluation steps.
    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    /// Sets the maximum execution duration.
    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Sets the maximum size of a single allocation in bytes.
    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }
}

/// A resource tracker that enforces configurable limits.
///
/// The start time is recorded when the tracker is created, so create it immediately before
/// starting execution.
#[derive(Debug)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    start_time: Instant,
    operation_count: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
            operation_count: 0,
        }
    }

    /// Returns the number of evaluation steps taken so far.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operation_count
    }

    /// Returns the elapsed time since tracker creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl ResourceTracker for LimitedTracker {
    fn check_time(&mut self) -> Result<(), ResourceError> {
        self.operation_count += 1;
        if let Some(max) = self.limits.max_operations
            && self.operation_count > max
        {
            return Err(ResourceError::Operation {
                limit: max,
                count: self.operation_count,
            });
        }

        if let Some(max) = self.limits.max_duration {
            let elapsed = self.start_time.elapsed();
            if elapsed > max {
                return Err(ResourceError::Time { limit: max, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth
            && current_depth >= max
        {
            return Err(ResourceError::Recursion {
                limit: max,
                depth: current_depth + 1,
            });
        }
        Ok(())
    }

    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError> {
        check_memory(self.limits.max_memory.unwrap_or(DEFAULT_MAX_MEMORY), estimated_bytes)
    }
}

/// Tracker with no operation or time limits.
///
/// The call-depth and memory limits still apply with their default values: an unbounded
/// recursion or allocation would otherwise abort the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn check_time(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_RECURSION_DEPTH {
            Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: current_depth + 1,
            })
        } else {
            Ok(())
        }
    }
    #[inline]
    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError> {
        check_memory(DEFAULT_MAX_MEMORY, estimated_bytes)
    }
}
