use roster_types::*;

pub const REPORT_HEADER: &str = "=== USER REPORT ===";

pub fn format_user(user: &User) -> String {
    format!("#{} {} <{}> [{}]", user.id, user.name, user.email, user.role)
}

pub fn format_add_user_result(result: &AddUserResult) -> String {
    format!("Added user {}", format_user(&result.user))
}

pub fn format_find_users_result(result: &FindUsersResult) -> String {
    if result.users.is_empty() {
        return "No matching users".to_string();
    }
    result
        .users
        .iter()
        .map(format_user)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_user_report(report: &UserReport) -> String {
    let mut lines = vec![
        REPORT_HEADER.to_string(),
        String::new(),
        format!("Total Users: {}", report.total_users),
        String::new(),
        "Role Distribution:".to_string(),
    ];

    if report.is_empty() {
        lines.push("  (no users)".to_string());
    } else {
        for entry in &report.roles {
            lines.push(format!(
                "  {}: {} ({:.1}%)",
                entry.role,
                entry.count,
                entry.percentage(report.total_users)
            ));
        }
    }

    lines.push(String::new());
    lines.push("Top Email Domains:".to_string());

    if report.is_empty() {
        lines.push("  (no users)".to_string());
    } else if report.domains.is_empty() {
        lines.push("  (no valid email domains)".to_string());
    } else {
        for entry in &report.domains {
            lines.push(format!("  {}: {} users", entry.domain, entry.count));
        }
    }

    lines.join("\n")
}
