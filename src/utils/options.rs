use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::utils::error::{PngError, PngResult};

/// Resource limits applied while decoding untrusted files.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// The maximum allowed canvas or frame width. The default is no limit.
    pub max_image_width: Option<u32>,
    /// The maximum allowed canvas or frame height. The default is no limit.
    pub max_image_height: Option<u32>,
    /// Upper bound for a single chunk payload and for the decoded pixel
    /// buffers of one file. The default is 512MiB.
    pub max_alloc: Option<u64>,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            max_image_width: None,
            max_image_height: None,
            max_alloc: Some(512 * 1024 * 1024),
        }
    }
}

impl Limits {
    pub fn no_limits() -> Limits {
        Limits {
            max_image_width: None,
            max_image_height: None,
            max_alloc: None,
        }
    }

    pub fn check_dimensions(&self, width: u32, height: u32) -> PngResult<()> {
        if let Some(max_width) = self.max_image_width {
            if width > max_width {
                return Err(PngError::LimitsExceeded(format!("width {} is above {}", width, max_width)));
            }
        }

        if let Some(max_height) = self.max_image_height {
            if height > max_height {
                return Err(PngError::LimitsExceeded(format!("height {} is above {}", height, max_height)));
            }
        }

        Ok(())
    }

    pub fn check_alloc(&self, bytes: u64) -> PngResult<()> {
        match self.max_alloc {
            Some(max_alloc) if bytes > max_alloc => Err(PngError::LimitsExceeded(format!(
                "{} bytes requested, {} allowed",
                bytes, max_alloc
            ))),
            _ => Ok(()),
        }
    }
}

/// Shared flag that aborts a running decode.
///
/// Clones observe the same flag, so one clone can be handed to the decoder
/// and another kept by whoever wants to stop it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> PngResult<()> {
        if self.is_cancelled() {
            return Err(PngError::Cancelled);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub limits: Limits,
    pub cancel: CancellationToken,
}

impl DecodeOptions {
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_cancel_flag() {
        let token = CancellationToken::new();
        let handle = token.clone();

        assert!(token.check().is_ok());
        handle.cancel();
        assert!(matches!(token.check(), Err(PngError::Cancelled)));
    }

    #[test]
    fn dimension_limits_are_inclusive() {
        let limits = Limits {
            max_image_width: Some(10),
            max_image_height: Some(5),
            ..Limits::default()
        };

        assert!(limits.check_dimensions(10, 5).is_ok());
        assert!(limits.check_dimensions(11, 5).is_err());
        assert!(limits.check_dimensions(10, 6).is_err());
    }
}
