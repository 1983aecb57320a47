//! Unix-style permissions on collections and documents
//!
//! Every resource carries an owner, a group and a 9-bit mode. The system
//! principal bypasses all checks; other principals are classified as owner,
//! group member or other, and the matching permission triple decides.

use docbase_core::{Error, Principal, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default mode of newly created collections (`rwxr-xr-x`)
pub const DEFAULT_COLLECTION_MODE: u32 = 0o755;

/// Default mode of newly created documents (`rw-r--r--`)
pub const DEFAULT_DOCUMENT_MODE: u32 = 0o644;

const READ: u32 = 0o4;
const WRITE: u32 = 0o2;

/// Kind of access being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read content or enumerate members
    Read,
    /// Create, replace or remove
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// Ownership and mode of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    owner: String,
    group: String,
    mode: u32,
}

impl Permissions {
    /// Permissions owned by `principal` with an explicit mode
    pub fn new(principal: Principal, mode: u32) -> Self {
        Permissions {
            owner: principal.user_name().to_string(),
            group: principal.group_name().to_string(),
            mode: mode & 0o777,
        }
    }

    /// Default permissions for a collection created by `principal`
    pub fn for_collection(principal: Principal) -> Self {
        Self::new(principal, DEFAULT_COLLECTION_MODE)
    }

    /// Default permissions for a document created by `principal`
    pub fn for_document(principal: Principal) -> Self {
        Self::new(principal, DEFAULT_DOCUMENT_MODE)
    }

    /// Owning user name
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Owning group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Raw 9-bit mode
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Unix-style descriptor, e.g. `rw-r--r--`
    pub fn descriptor(&self) -> String {
        let mut out = String::with_capacity(9);
        for shift in [6u32, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }

    /// True if `principal` may perform `access`
    pub fn allows(&self, principal: Principal, access: Access) -> bool {
        if principal.is_system() {
            return true;
        }
        let shift = if principal.user_name() == self.owner {
            6
        } else if principal.group_name() == self.group {
            3
        } else {
            0
        };
        let bits = (self.mode >> shift) & 0o7;
        let wanted = match access {
            Access::Read => READ,
            Access::Write => WRITE,
        };
        bits & wanted != 0
    }

    /// Fail with `PermissionDenied` unless `principal` may perform `access` on `resource`
    pub fn check(&self, principal: Principal, access: Access, resource: &str) -> Result<()> {
        if self.allows(principal, access) {
            Ok(())
        } else {
            Err(Error::permission_denied(format!(
                "{} may not {} {} ({} {}:{})",
                principal,
                access,
                resource,
                self.descriptor(),
                self.owner,
                self.group
            )))
        }
    }
}
