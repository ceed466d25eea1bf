/// Role ids as carried in the access token's `role` claim.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            _ => None,
        }
    }

    /// Recap, dashboard and late summary cover every employee.
    pub fn sees_all_employees(self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }
}
