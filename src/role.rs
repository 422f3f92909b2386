use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    View,
    Create,
    Edit,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::View,
        Operation::Create,
        Operation::Edit,
        Operation::Delete,
    ];

    const fn bit(self) -> u8 {
        match self {
            Operation::View => 1,
            Operation::Create => 1 << 1,
            Operation::Edit => 1 << 2,
            Operation::Delete => 1 << 3,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::Create => "create",
            Operation::Edit => "edit",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Set of operations a role may perform.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions(u8);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const ALL: Permissions = Permissions::of(&Operation::ALL);

    pub const fn of(operations: &[Operation]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < operations.len() {
            bits |= operations[i].bit();
            i += 1;
        }
        Permissions(bits)
    }

    pub fn allows(self, operation: Operation) -> bool {
        self.0 & operation.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL
            .into_iter()
            .filter(move |operation| self.allows(*operation))
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Session role, picked once when the records window opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Role {
    Administrator,
    Manager,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Administrator, Role::Manager, Role::Viewer];

    pub const fn permissions(self) -> Permissions {
        match self {
            Role::Administrator => Permissions::ALL,
            Role::Manager => Permissions::of(&[Operation::View, Operation::Create]),
            Role::Viewer => Permissions::of(&[Operation::View]),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Administrator => "Administrator",
            Role::Manager => "Manager",
            Role::Viewer => "Viewer",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Role::Administrator => "view, create, edit and delete records",
            Role::Manager => "view and create records",
            Role::Viewer => "view records",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Permissions for a session: gated entities use the role's table, ungated
/// entities permit everything.
pub fn session_permissions(role: Option<Role>, role_gated: bool) -> Permissions {
    match (role_gated, role) {
        (false, _) => Permissions::ALL,
        (true, Some(role)) => role.permissions(),
        (true, None) => Permissions::NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrator_can_do_everything() {
        let permissions = Role::Administrator.permissions();
        for operation in Operation::ALL {
            assert!(permissions.allows(operation), "{operation}");
        }
    }

    #[test]
    fn manager_can_view_and_create_only() {
        let permissions = Role::Manager.permissions();
        assert_eq!(
            permissions.iter().collect::<Vec<_>>(),
            vec![Operation::View, Operation::Create]
        );
        assert!(!permissions.allows(Operation::Edit));
        assert!(!permissions.allows(Operation::Delete));
    }

    #[test]
    fn viewer_can_only_view() {
        let permissions = Role::Viewer.permissions();
        assert_eq!(permissions.iter().collect::<Vec<_>>(), vec![Operation::View]);
    }

    #[test]
    fn ungated_entities_ignore_the_role() {
        assert_eq!(session_permissions(Some(Role::Viewer), false), Permissions::ALL);
        assert_eq!(session_permissions(None, false), Permissions::ALL);
        assert_eq!(
            session_permissions(Some(Role::Manager), true),
            Role::Manager.permissions()
        );
        assert_eq!(session_permissions(None, true), Permissions::NONE);
    }

    #[test]
    fn permissions_debug_lists_operations() {
        assert_eq!(
            format!("{:?}", Role::Manager.permissions()),
            "{View, Create}"
        );
    }
}
