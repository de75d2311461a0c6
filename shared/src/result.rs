//! Result codes carried in every reply payload

use std::fmt;

/// Outcome of a command. `0` is success, every failure is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,

    // Validation
    MalformedPayload = -1,
    SizeMismatch = -2,
    InvalidModuleName = -3,

    // State conflicts
    AlreadyCreated = -10,
    NotCreated = -11,
    AlreadyRunning = -12,
    NotRunning = -13,
    ModuleRunning = -14,

    // Resources
    AllocationFailed = -20,
    WriteFailed = -21,
    NotFound = -22,
    EngineFailure = -23,
}

/// Broad class of a result code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCategory {
    Success,
    Validation,
    StateConflict,
    Resource,
}

impl ResultCode {
    const ALL: [ResultCode; 13] = [
        ResultCode::Ok,
        ResultCode::MalformedPayload,
        ResultCode::SizeMismatch,
        ResultCode::InvalidModuleName,
        ResultCode::AlreadyCreated,
        ResultCode::NotCreated,
        ResultCode::AlreadyRunning,
        ResultCode::NotRunning,
        ResultCode::ModuleRunning,
        ResultCode::AllocationFailed,
        ResultCode::WriteFailed,
        ResultCode::NotFound,
        ResultCode::EngineFailure,
    ];

    /// Integer value placed in the reply
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a wire value back to a known code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }

    pub fn category(self) -> ResultCategory {
        match self.code() {
            0 => ResultCategory::Success,
            -9..=-1 => ResultCategory::Validation,
            -19..=-10 => ResultCategory::StateConflict,
            _ => ResultCategory::Resource,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_wire_value() {
        for code in ResultCode::ALL {
            assert_eq!(ResultCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ResultCode::from_code(-99), None);
    }

    #[test]
    fn test_only_ok_is_non_negative() {
        for code in ResultCode::ALL {
            assert_eq!(code.code() >= 0, code.is_ok());
        }
    }

    #[test]
    fn test_categories() {
        assert_eq!(ResultCode::SizeMismatch.category(), ResultCategory::Validation);
        assert_eq!(ResultCode::AlreadyRunning.category(), ResultCategory::StateConflict);
        assert_eq!(ResultCode::WriteFailed.category(), ResultCategory::Resource);
        assert_eq!(ResultCode::Ok.category(), ResultCategory::Success);
    }
}
