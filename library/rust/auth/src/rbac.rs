//! RBAC: ロール × リソース × アクションの認可判定。

use std::fmt;
use std::str::FromStr;

use crate::claims::Claims;

/// Role は ERP のユーザーロール。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Accountant,
    Cashier,
    Storekeeper,
    Staff,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "ACCOUNTANT" => Ok(Role::Accountant),
            "CASHIER" => Ok(Role::Cashier),
            "STOREKEEPER" => Ok(Role::Storekeeper),
            "STAFF" => Ok(Role::Staff),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Resource は認可対象の業務領域。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Masters,
    Inventory,
    Purchases,
    Sales,
    Finance,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Masters => "masters",
            Resource::Inventory => "inventory",
            Resource::Purchases => "purchases",
            Resource::Sales => "sales",
            Resource::Finance => "finance",
        }
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "masters" => Ok(Resource::Masters),
            "inventory" => Ok(Resource::Inventory),
            "purchases" => Ok(Resource::Purchases),
            "sales" => Ok(Resource::Sales),
            "finance" => Ok(Resource::Finance),
            other => Err(format!("unknown resource: {other}")),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action はリソースに対する操作レベル。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Admin,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Admin => "admin",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Action::Read),
            "write" => Ok(Action::Write),
            "admin" => Ok(Action::Admin),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Role {
    /// allows はロールの権限マトリクスを評価する。
    pub fn allows(self, resource: Resource, action: Action) -> bool {
        use Action::{Admin, Read, Write};
        use Resource::{Finance, Inventory, Masters, Purchases, Sales};

        match self {
            Role::Admin => true,
            Role::Manager => match action {
                Read | Write => true,
                Admin => matches!(resource, Masters | Purchases | Sales),
            },
            Role::Accountant => action == Read || resource == Finance,
            Role::Cashier => match action {
                Read => matches!(resource, Masters | Inventory | Sales),
                Write => resource == Sales,
                Admin => false,
            },
            Role::Storekeeper => match action {
                Read => matches!(resource, Masters | Inventory | Purchases),
                Write => matches!(resource, Inventory | Purchases),
                Admin => false,
            },
            Role::Staff => action == Read && matches!(resource, Masters | Inventory),
        }
    }
}

/// Claims のロールを解釈する。未知のロールは None。
pub fn role_of(claims: &Claims) -> Option<Role> {
    claims.role.as_deref().and_then(|r| r.parse().ok())
}

/// Claims に指定の権限があるかを判定する。
///
/// スーパー管理者は全権限を持つ。ロールのマトリクスに加え、
/// `{resource}:{action}` 形式の明示パーミッションも許可として扱う。
pub fn has_permission(claims: &Claims, resource: Resource, action: Action) -> bool {
    if claims.is_super_admin {
        return true;
    }

    if role_of(claims).is_some_and(|role| role.allows(resource, action)) {
        return true;
    }

    let wanted = format!("{resource}:{action}");
    claims.permissions.iter().any(|p| *p == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_claims(role: Option<&str>, permissions: Vec<&str>) -> Claims {
        Claims {
            sub: "user-1".into(),
            email: Some("staff@yeelo.example".into()),
            name: None,
            role: role.map(String::from),
            permissions: permissions.into_iter().map(String::from).collect(),
            is_super_admin: false,
            exp: 9_999_999_999,
            iat: 1_000_000_000,
            iss: None,
        }
    }

    #[test]
    fn test_admin_has_everything() {
        let claims = make_claims(Some("ADMIN"), vec![]);
        assert!(has_permission(&claims, Resource::Finance, Action::Admin));
        assert!(has_permission(&claims, Resource::Masters, Action::Admin));
    }

    #[test]
    fn test_manager_matrix() {
        let claims = make_claims(Some("MANAGER"), vec![]);
        assert!(has_permission(&claims, Resource::Finance, Action::Write));
        assert!(has_permission(&claims, Resource::Sales, Action::Admin));
        assert!(!has_permission(&claims, Resource::Finance, Action::Admin));
        assert!(!has_permission(&claims, Resource::Inventory, Action::Admin));
    }

    #[test]
    fn test_accountant_matrix() {
        let claims = make_claims(Some("accountant"), vec![]);
        assert!(has_permission(&claims, Resource::Sales, Action::Read));
        assert!(has_permission(&claims, Resource::Finance, Action::Admin));
        assert!(!has_permission(&claims, Resource::Sales, Action::Write));
    }

    #[test]
    fn test_cashier_matrix() {
        let claims = make_claims(Some("CASHIER"), vec![]);
        assert!(has_permission(&claims, Resource::Sales, Action::Write));
        assert!(has_permission(&claims, Resource::Inventory, Action::Read));
        assert!(!has_permission(&claims, Resource::Sales, Action::Admin));
        assert!(!has_permission(&claims, Resource::Purchases, Action::Read));
    }

    #[test]
    fn test_storekeeper_matrix() {
        let claims = make_claims(Some("STOREKEEPER"), vec![]);
        assert!(has_permission(&claims, Resource::Purchases, Action::Write));
        assert!(has_permission(&claims, Resource::Inventory, Action::Write));
        assert!(!has_permission(&claims, Resource::Purchases, Action::Admin));
        assert!(!has_permission(&claims, Resource::Finance, Action::Read));
    }

    #[test]
    fn test_staff_read_only() {
        let claims = make_claims(Some("STAFF"), vec![]);
        assert!(has_permission(&claims, Resource::Masters, Action::Read));
        assert!(!has_permission(&claims, Resource::Masters, Action::Write));
        assert!(!has_permission(&claims, Resource::Sales, Action::Read));
    }

    #[test]
    fn test_explicit_permission_grants() {
        let claims = make_claims(Some("STAFF"), vec!["finance:read"]);
        assert!(has_permission(&claims, Resource::Finance, Action::Read));
        assert!(!has_permission(&claims, Resource::Finance, Action::Write));
    }

    #[test]
    fn test_super_admin_without_role() {
        let mut claims = make_claims(None, vec![]);
        claims.is_super_admin = true;
        assert!(has_permission(&claims, Resource::Finance, Action::Admin));
    }

    #[test]
    fn test_unknown_role_denied() {
        let claims = make_claims(Some("GUEST"), vec![]);
        assert!(!has_permission(&claims, Resource::Masters, Action::Read));
    }
}
