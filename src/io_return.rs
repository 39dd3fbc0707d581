use std::{error::Error, fmt, io};

const fn iokit_common_err(code: u32) -> i32 {
    // err_system(0x38) | err_sub(0) | code
    (0xe000_0000_u32 | code) as i32
}

ffi_enum! {
    /// A status code returned by the device registry (`kern_return_t` / `IOReturn`).
    ///
    /// Codes that have no associated constant are preserved as-is and printed in hex.
    pub enum IoReturn: i32 as "IoReturn::" {
        SUCCESS = 0,
        /// Generic `KERN_FAILURE`.
        KERN_FAILURE = 5,
        ERROR = iokit_common_err(0x2bc),
        NO_MEMORY = iokit_common_err(0x2bd),
        NO_RESOURCES = iokit_common_err(0x2be),
        IPC_ERROR = iokit_common_err(0x2bf),
        NO_DEVICE = iokit_common_err(0x2c0),
        NOT_PRIVILEGED = iokit_common_err(0x2c1),
        BAD_ARGUMENT = iokit_common_err(0x2c2),
        EXCLUSIVE_ACCESS = iokit_common_err(0x2c5),
        UNSUPPORTED = iokit_common_err(0x2c7),
    }
}

impl IoReturn {
    /// Turns [`IoReturn::SUCCESS`] into `Ok(())` and everything else into `Err(self)`.
    #[inline]
    pub fn check(self) -> Result<(), Self> {
        if self == Self::SUCCESS {
            Ok(())
        } else {
            Err(self)
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for IoReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = match *self {
            Self::SUCCESS => "success",
            Self::KERN_FAILURE => "kernel call failed",
            Self::ERROR => "general error",
            Self::NO_MEMORY => "can't allocate memory",
            Self::NO_RESOURCES => "resource shortage",
            Self::IPC_ERROR => "error during IPC",
            Self::NO_DEVICE => "no such device",
            Self::NOT_PRIVILEGED => "privilege violation",
            Self::BAD_ARGUMENT => "invalid argument",
            Self::EXCLUSIVE_ACCESS => "exclusive access and device already open",
            Self::UNSUPPORTED => "unsupported function",
            _ => return write!(f, "registry error {:#010x}", self.0),
        };
        write!(f, "{desc} ({:#010x})", self.0)
    }
}

impl Error for IoReturn {}

impl From<IoReturn> for io::Error {
    fn from(status: IoReturn) -> Self {
        let kind = match status {
            IoReturn::NO_MEMORY | IoReturn::NO_RESOURCES => io::ErrorKind::OutOfMemory,
            IoReturn::NO_DEVICE => io::ErrorKind::NotFound,
            IoReturn::NOT_PRIVILEGED => io::ErrorKind::PermissionDenied,
            IoReturn::BAD_ARGUMENT => io::ErrorKind::InvalidInput,
            IoReturn::EXCLUSIVE_ACCESS => io::ErrorKind::ResourceBusy,
            IoReturn::UNSUPPORTED => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_repr() {
        assert_eq!(format!("{:?}", IoReturn::SUCCESS), "IoReturn::SUCCESS");
        assert_eq!(format!("{:?}", IoReturn::NO_DEVICE), "IoReturn::NO_DEVICE");
        assert_eq!(
            format!("{:?}", IoReturn::from_raw(0x1234)),
            "IoReturn(0x1234)"
        );

        assert_eq!(IoReturn::BAD_ARGUMENT.raw() as u32, 0xe00002c2);
        assert_eq!(
            IoReturn::NO_MEMORY.to_string(),
            "can't allocate memory (0xe00002bd)"
        );
        assert_eq!(
            IoReturn::from_raw(0x1234).to_string(),
            "registry error 0x00001234"
        );
    }

    #[test]
    fn check() {
        assert_eq!(IoReturn::SUCCESS.check(), Ok(()));
        assert_eq!(IoReturn::ERROR.check(), Err(IoReturn::ERROR));
        assert!(!IoReturn::from_raw(-1).is_success());
    }

    #[test]
    fn into_io_error() {
        let err = io::Error::from(IoReturn::UNSUPPORTED);
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        let err = io::Error::from(IoReturn::from_raw(42));
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(
            err.get_ref().and_then(|e| e.downcast_ref::<IoReturn>()),
            Some(&IoReturn::from_raw(42))
        );
    }
}
