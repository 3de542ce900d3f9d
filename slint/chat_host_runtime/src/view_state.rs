use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderRejected {
    #[error("sid mismatch for render envelope: expected={expected}, got={got}")]
    SidMismatch { expected: String, got: String },
    #[error("render revision mismatch: rev={rev}, expected={expected}")]
    RevisionMismatch { rev: u64, expected: u64 },
}

/// Revision of the last render applied to the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub last_rev: Option<u64>,
}

impl ViewState {
    pub fn check_render(&self, expected_sid: &str, sid: &str, rev: u64) -> Result<(), RenderRejected> {
        if sid != expected_sid {
            return Err(RenderRejected::SidMismatch {
                expected: expected_sid.to_string(),
                got: sid.to_string(),
            });
        }
        self.validate_render_rev(rev)
    }

    /// The first render may carry any revision; later ones must be consecutive.
    pub fn validate_render_rev(&self, rev: u64) -> Result<(), RenderRejected> {
        match self.last_rev {
            Some(last_rev) if rev == last_rev.wrapping_add(1) => Ok(()),
            Some(last_rev) => Err(RenderRejected::RevisionMismatch {
                rev,
                expected: last_rev.wrapping_add(1),
            }),
            None => Ok(()),
        }
    }

    pub fn apply(&mut self, rev: u64) {
        self.last_rev = Some(rev);
    }

    pub fn reset_for_resync(&mut self) {
        *self = ViewState::default();
    }
}

pub fn should_resync_for_error(code: &str) -> bool {
    matches!(
        code,
        "decode_error" | "frame_too_large" | "invalid_envelope" | "resync_required" | "rev_mismatch"
    )
}
