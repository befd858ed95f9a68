//! `burrow project` subcommands.

use anyhow::Result;

use burrow_core::workspace::ProjectWorkspaces;
use burrow_db::models::Project;

use crate::app::Stores;

pub async fn cmd_project_create(
    stores: &Stores,
    workspaces: &ProjectWorkspaces,
    name: &str,
    owner: &str,
) -> Result<()> {
    let name = name.trim();
    anyhow::ensure!(!name.is_empty(), "project name must not be empty");

    let project = stores.projects.create(name, owner).await?;
    let dir = workspaces.ensure(project.id).await?;

    println!("Created project {}", project.id);
    println!("  name:      {}", project.name);
    println!("  owner:     {}", project.user_email);
    println!("  directory: {}", dir.display());
    Ok(())
}

pub async fn cmd_project_list(stores: &Stores, owner: &str) -> Result<()> {
    let projects = stores.projects.list_for_owner(owner).await?;
    if projects.is_empty() {
        println!("No projects for {owner}.");
        return Ok(());
    }
    print!("{}", format_projects(&projects));
    Ok(())
}

fn format_projects(projects: &[Project]) -> String {
    let name_width = projects
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!("{:<36}  {:<name_width$}  CREATED\n", "ID", "NAME");
    for project in projects {
        out.push_str(&format!(
            "{:<36}  {:<name_width$}  {}\n",
            project.id,
            project.name,
            project.created_at.format("%Y-%m-%d %H:%M")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn projects_table_aligns_columns() {
        let id = Uuid::nil();
        let projects = vec![
            Project {
                id,
                name: "etl".to_string(),
                user_email: "a@example.com".to_string(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            },
            Project {
                id,
                name: "dashboards".to_string(),
                user_email: "a@example.com".to_string(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
            },
        ];

        let table = format_projects(&projects);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].ends_with("etl         2026-03-01 09:30"));
        assert!(lines[2].ends_with("dashboards  2026-03-02 10:00"));
    }
}
