//! # CarePlus (clinical records backend)
//!
//! `careplus` exposes CRUD endpoints for patients, consultations, diagnostics,
//! treatments and user accounts. Storage, authentication and row-level access
//! control are delegated to a hosted Supabase project (GoTrue + PostgREST);
//! this service validates input, applies the role policy and translates
//! outcomes into HTTP responses.
//!
//! ## Two-step login
//!
//! Password credentials are verified against GoTrue, then a 6-digit one-time
//! code is persisted in the `verification_codes` table and mailed to the user.
//! The access token is only released once `/auth/verify-otp` succeeds. Codes
//! expire after 10 minutes and allow 5 attempts; expired and missing codes are
//! indistinguishable to callers.
//!
//! ## Authorization & roles
//!
//! User management is gated by a fixed role hierarchy
//! (`superadmin > admin > medico > enfermero > recepcionista`). Superadmins
//! manage every role except their own tier; admins manage only the clinical
//! roles. Nobody can delete their own account. Clinical tables are protected
//! by Supabase RLS, so every table call carries the caller's bearer token.

pub mod api;
pub mod cli;
pub mod supabase;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
