use crate::model::{Id, UserContext};

/// Decides who may change a project's milestone templates.
pub trait TemplateAuthorizer: Send + Sync {
    fn can_edit_templates(&self, actor: &UserContext, project_id: &Id) -> bool;
}

/// Grants template editing to actors holding one of a fixed set of roles.
#[derive(Debug, Clone)]
pub struct RoleAuthorizer {
    editor_roles: Vec<String>,
}

impl RoleAuthorizer {
    pub fn new<I, R>(editor_roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            editor_roles: editor_roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for RoleAuthorizer {
    fn default() -> Self {
        Self::new(["owner", "admin", "project_manager"])
    }
}

impl TemplateAuthorizer for RoleAuthorizer {
    fn can_edit_templates(&self, actor: &UserContext, _project_id: &Id) -> bool {
        actor.is_system() || self.editor_roles.iter().any(|role| actor.has_role(role))
    }
}
