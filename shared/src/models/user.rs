//! User and role models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::ParseEnumError;

/// A user account on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed store roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Manager,
    Staff,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::Admin, UserRole::Manager, UserRole::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Manager => "MANAGER",
            UserRole::Staff => "STAFF",
        }
    }

    /// Whether this role grants `action` on `resource`
    pub fn can(&self, resource: Resource, action: Action) -> bool {
        permissions_for(*self)
            .iter()
            .any(|p| p.resource == resource && p.actions.contains(&action))
    }

    /// Flattened `resource:action` strings, used in API responses
    pub fn permission_strings(&self) -> Vec<String> {
        permissions_for(*self)
            .iter()
            .flat_map(|p| {
                p.actions
                    .iter()
                    .map(move |a| format!("{}:{}", p.resource.as_str(), a.as_str()))
            })
            .collect()
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(UserRole::Admin),
            "MANAGER" => Ok(UserRole::Manager),
            "STAFF" => Ok(UserRole::Staff),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

/// Resources that can be accessed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Product,
    Category,
    Brand,
    Supplier,
    Reconciliation,
    PurchaseOrder,
    Sale,
    Transaction,
    Report,
    User,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Product => "product",
            Resource::Category => "category",
            Resource::Brand => "brand",
            Resource::Supplier => "supplier",
            Resource::Reconciliation => "reconciliation",
            Resource::PurchaseOrder => "purchase_order",
            Resource::Sale => "sale",
            Resource::Transaction => "transaction",
            Resource::Report => "report",
            Resource::User => "user",
        }
    }
}

/// Actions that can be performed on resources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Approve,
    Void,
    Export,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Void => "void",
            Action::Export => "export",
        }
    }
}

/// A permission granting actions on a resource
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Permission {
    pub resource: Resource,
    pub actions: &'static [Action],
}

const CRUD: &[Action] = &[Action::View, Action::Create, Action::Edit, Action::Delete];
const VIEW: &[Action] = &[Action::View];

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission { resource: Resource::Product, actions: CRUD },
    Permission { resource: Resource::Category, actions: CRUD },
    Permission { resource: Resource::Brand, actions: CRUD },
    Permission { resource: Resource::Supplier, actions: CRUD },
    Permission {
        resource: Resource::Reconciliation,
        actions: &[Action::View, Action::Create, Action::Edit, Action::Delete, Action::Approve],
    },
    Permission {
        resource: Resource::PurchaseOrder,
        actions: &[Action::View, Action::Create, Action::Edit, Action::Delete, Action::Approve],
    },
    Permission {
        resource: Resource::Sale,
        actions: &[Action::View, Action::Create, Action::Void],
    },
    Permission {
        resource: Resource::Transaction,
        actions: &[Action::View, Action::Create, Action::Export],
    },
    Permission {
        resource: Resource::Report,
        actions: &[Action::View, Action::Export],
    },
    Permission { resource: Resource::User, actions: CRUD },
];

const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission { resource: Resource::Product, actions: CRUD },
    Permission { resource: Resource::Category, actions: CRUD },
    Permission { resource: Resource::Brand, actions: CRUD },
    Permission { resource: Resource::Supplier, actions: CRUD },
    Permission { resource: Resource::Reconciliation, actions: CRUD },
    Permission {
        resource: Resource::PurchaseOrder,
        actions: &[Action::View, Action::Create, Action::Edit, Action::Approve],
    },
    Permission {
        resource: Resource::Sale,
        actions: &[Action::View, Action::Create, Action::Void],
    },
    Permission {
        resource: Resource::Transaction,
        actions: &[Action::View, Action::Create, Action::Export],
    },
    Permission {
        resource: Resource::Report,
        actions: &[Action::View, Action::Export],
    },
    Permission { resource: Resource::User, actions: VIEW },
];

const STAFF_PERMISSIONS: &[Permission] = &[
    Permission { resource: Resource::Product, actions: VIEW },
    Permission { resource: Resource::Category, actions: VIEW },
    Permission { resource: Resource::Brand, actions: VIEW },
    Permission { resource: Resource::Supplier, actions: VIEW },
    Permission {
        resource: Resource::Reconciliation,
        actions: &[Action::View, Action::Create, Action::Edit],
    },
    Permission { resource: Resource::PurchaseOrder, actions: VIEW },
    Permission {
        resource: Resource::Sale,
        actions: &[Action::View, Action::Create],
    },
];

/// Static permission matrix for a role
pub fn permissions_for(role: UserRole) -> &'static [Permission] {
    match role {
        UserRole::Admin => ADMIN_PERMISSIONS,
        UserRole::Manager => MANAGER_PERMISSIONS,
        UserRole::Staff => STAFF_PERMISSIONS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_approves_reconciliations() {
        assert!(UserRole::Admin.can(Resource::Reconciliation, Action::Approve));
        assert!(!UserRole::Manager.can(Resource::Reconciliation, Action::Approve));
        assert!(!UserRole::Staff.can(Resource::Reconciliation, Action::Approve));
    }

    #[test]
    fn staff_can_sell_but_not_void() {
        assert!(UserRole::Staff.can(Resource::Sale, Action::Create));
        assert!(!UserRole::Staff.can(Resource::Sale, Action::Void));
        assert!(!UserRole::Staff.can(Resource::Transaction, Action::View));
    }

    #[test]
    fn permission_strings_are_resource_action_pairs() {
        let perms = UserRole::Staff.permission_strings();
        assert!(perms.contains(&"sale:create".to_string()));
        assert!(perms.contains(&"reconciliation:edit".to_string()));
        assert!(!perms.contains(&"user:view".to_string()));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("Staff".parse::<UserRole>().unwrap(), UserRole::Staff);
        assert!("owner".parse::<UserRole>().is_err());
    }
}
