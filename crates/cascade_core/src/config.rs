//! Session configuration.

use cascade_value::DEFAULT_NULL_TOKEN;

/// Names of the attributes stamped on every attribute save.
///
/// An attribute set only gets the stamps whose names it actually defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditNames {
    /// Set when the first value row of an object is written.
    pub created_at: String,
    /// Acting user recorded with `created_at`.
    pub created_by: String,
    /// Set on every save.
    pub modified_at: String,
    /// Acting user recorded with `modified_at`.
    pub modified_by: String,
}

impl Default for AuditNames {
    fn default() -> Self {
        Self {
            created_at: "created_at".to_string(),
            created_by: "created_by".to_string(),
            modified_at: "modified_at".to_string(),
            modified_by: "modified_by".to_string(),
        }
    }
}

/// Configuration shared by every node of a session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tenant id, part of the attribute definition cache key.
    pub tenant: String,

    /// String stored for an explicit null attribute value.
    pub null_token: String,

    /// Read-only flag used when a node leaves it unset.
    pub default_read_only: bool,

    /// Can-delete flag used when a node leaves it unset.
    pub default_can_delete: bool,

    /// Whether collections create members on access of an unknown key.
    pub auto_create_members: bool,

    /// Whether validation rejects text longer than the column size.
    pub check_string_length: bool,

    /// Audit attribute names.
    pub audit: AuditNames,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            null_token: DEFAULT_NULL_TOKEN.to_string(),
            default_read_only: false,
            default_can_delete: true,
            auto_create_members: true,
            check_string_length: true,
            audit: AuditNames::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tenant id.
    #[must_use]
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    /// Sets the null sentinel for attribute rows.
    #[must_use]
    pub fn null_token(mut self, token: impl Into<String>) -> Self {
        self.null_token = token.into();
        self
    }

    /// Sets the default read-only flag.
    #[must_use]
    pub const fn default_read_only(mut self, value: bool) -> Self {
        self.default_read_only = value;
        self
    }

    /// Sets the default can-delete flag.
    #[must_use]
    pub const fn default_can_delete(mut self, value: bool) -> Self {
        self.default_can_delete = value;
        self
    }

    /// Sets whether collections auto-create members.
    #[must_use]
    pub const fn auto_create_members(mut self, value: bool) -> Self {
        self.auto_create_members = value;
        self
    }

    /// Sets whether string lengths are validated.
    #[must_use]
    pub const fn check_string_length(mut self, value: bool) -> Self {
        self.check_string_length = value;
        self
    }

    /// Sets the audit attribute names.
    #[must_use]
    pub fn audit(mut self, audit: AuditNames) -> Self {
        self.audit = audit;
        self
    }
}
