use axum::Json;

use crate::{api::types::AccessReportResponse, auth::RequestContext, models::Permission};

/// What the calling principal is allowed to do
pub async fn access_report(context: RequestContext) -> Json<AccessReportResponse> {
    let principal = context.principal;
    let effective_permissions = if principal.is_admin() {
        Permission::all()
    } else {
        principal.permissions.clone()
    };

    Json(AccessReportResponse {
        success: true,
        actor_id: principal.audit_actor_id(),
        role: principal.role,
        permissions: principal.permissions,
        effective_permissions,
        scheme: context.scheme,
    })
}
