use std::error::Error;
use std::fmt::{Display, Formatter};

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error categories for failures of the harness itself, as opposed to
/// scientific mismatches, which are scenario outcomes (see `orchestrate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessErrorCategory {
    Success,
    ConfigurationError,
    IoSystemError,
    LaunchError,
    InternalError,
}

impl HarnessErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ConfigurationError => 2,
            Self::IoSystemError => 3,
            Self::LaunchError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ConfigurationError => "ConfigurationError",
            Self::IoSystemError => "IoSystemError",
            Self::LaunchError => "LaunchError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessError {
    category: HarnessErrorCategory,
    code: &'static str,
    message: String,
}

impl HarnessError {
    pub fn new(
        category: HarnessErrorCategory,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::ConfigurationError, code, message)
    }

    pub fn io_system(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::IoSystemError, code, message)
    }

    pub fn launch(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::LaunchError, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::InternalError, code, message)
    }

    pub const fn category(&self) -> HarnessErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.code, self.message)
    }
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.label(),
            self.code,
            self.message
        )
    }
}

impl Error for HarnessError {}
