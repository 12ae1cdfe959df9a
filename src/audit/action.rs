//! Recognized audit actions. The set is open: actions are stored as plain
//! text and new ones are added as the product grows, so these constants exist
//! for call sites and tests rather than as an exhaustive enum.

pub const DOCUMENT_CREATE: &str = "document.create";
pub const DOCUMENT_VIEW: &str = "document.view";
pub const DOCUMENT_VIEW_DENIED: &str = "document.view_denied";

pub const USER_REGISTERED: &str = "user.registered";
pub const USER_CREATED: &str = "user.created";
pub const USER_LOGIN: &str = "user.login";

pub const WORKSPACE_CREATED: &str = "workspace.created";
