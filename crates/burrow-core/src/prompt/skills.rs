//! Skill discovery and installation.
//!
//! A skill is a directory containing a `SKILL.md` whose YAML frontmatter
//! carries at least `name` and `description`. Only the frontmatter is read
//! here; the agent loads the body itself through the `Skill` tool, which
//! looks under `.claude/skills/` of its working directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

pub const SKILL_FILE: &str = "SKILL.md";

/// Where skills live inside a project directory.
pub const PROJECT_SKILLS_DIR: &str = ".claude/skills";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SkillParseError {
    #[error("missing YAML frontmatter")]
    MissingFrontmatter,

    #[error("unterminated YAML frontmatter")]
    UnterminatedFrontmatter,

    #[error("invalid YAML frontmatter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("frontmatter field '{0}' is missing or empty")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

/// Parse the frontmatter of a `SKILL.md` document.
pub fn parse_skill(content: &str, path: &Path) -> Result<Skill, SkillParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.lines();
    if lines.next().map(str::trim) != Some("---") {
        return Err(SkillParseError::MissingFrontmatter);
    }

    let mut yaml_lines = Vec::new();
    let mut terminated = false;
    for line in lines {
        let trimmed = line.trim();
        if trimmed == "---" || trimmed == "..." {
            terminated = true;
            break;
        }
        yaml_lines.push(line);
    }
    if !terminated {
        return Err(SkillParseError::UnterminatedFrontmatter);
    }

    let frontmatter: Frontmatter = serde_yaml::from_str(&yaml_lines.join("\n"))?;
    let name = non_empty(frontmatter.name).ok_or(SkillParseError::MissingField("name"))?;
    let description =
        non_empty(frontmatter.description).ok_or(SkillParseError::MissingField("description"))?;

    Ok(Skill {
        name,
        description,
        path: path.to_path_buf(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    skills: Vec<Skill>,
}

impl SkillCatalog {
    /// Load every `<dir>/*/SKILL.md`. Invalid skills are logged and skipped;
    /// a missing directory yields an empty catalog.
    pub fn load(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "no skills directory");
                return Self::default();
            }
        };

        let mut skills = Vec::new();
        for entry in entries.flatten() {
            let skill_file = entry.path().join(SKILL_FILE);
            if !skill_file.is_file() {
                continue;
            }
            let content = match std::fs::read_to_string(&skill_file) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %skill_file.display(), error = %e, "failed to read skill");
                    continue;
                }
            };
            match parse_skill(&content, &skill_file) {
                Ok(skill) => skills.push(skill),
                Err(e) => warn!(path = %skill_file.display(), error = %e, "skipping invalid skill"),
            }
        }

        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills.dedup_by(|later, earlier| {
            let duplicate = later.name == earlier.name;
            if duplicate {
                warn!(name = %later.name, path = %later.path.display(), "duplicate skill name ignored");
            }
            duplicate
        });

        Self { skills }
    }

    pub fn from_skills(skills: Vec<Skill>) -> Self {
        Self { skills }
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Copy every skill directory into `<project_dir>/.claude/skills/<name>/`.
    ///
    /// Existing files are overwritten so edits to the source skills reach
    /// projects on their next turn. Files the project added are left alone.
    pub async fn install_into(&self, project_dir: &Path) -> Result<()> {
        if self.skills.is_empty() {
            return Ok(());
        }

        let target = project_dir.join(PROJECT_SKILLS_DIR);
        let sources: Vec<(String, PathBuf)> = self
            .skills
            .iter()
            .filter_map(|skill| {
                let dir = skill.path.parent()?;
                Some((skill.name.clone(), dir.to_path_buf()))
            })
            .collect();

        tokio::task::spawn_blocking(move || {
            for (name, source) in &sources {
                let dest = target.join(name);
                copy_dir(source, &dest).with_context(|| {
                    format!("failed to install skill '{name}' into {}", dest.display())
                })?;
                debug!(skill = %name, dest = %dest.display(), "installed skill");
            }
            Ok(())
        })
        .await
        .context("skill install task panicked")?
    }
}

fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;
    let entries =
        std::fs::read_dir(source).with_context(|| format!("failed to read {}", source.display()))?;

    for entry in entries {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else if file_type.is_file() {
            std::fs::copy(&from, &to)
                .with_context(|| format!("failed to copy {}", from.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, dir: &str, content: &str) {
        let skill_dir = root.join(dir);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join(SKILL_FILE), content).unwrap();
    }

    #[test]
    fn parses_frontmatter() {
        let skill = parse_skill(
            "---\nname: sdp\ndescription: Declarative pipelines\n---\n# Body\n",
            Path::new("/skills/sdp/SKILL.md"),
        )
        .unwrap();
        assert_eq!(skill.name, "sdp");
        assert_eq!(skill.description, "Declarative pipelines");
    }

    #[test]
    fn rejects_bad_frontmatter() {
        let path = Path::new("SKILL.md");
        assert!(matches!(
            parse_skill("# no frontmatter", path),
            Err(SkillParseError::MissingFrontmatter)
        ));
        assert!(matches!(
            parse_skill("---\nname: x\n", path),
            Err(SkillParseError::UnterminatedFrontmatter)
        ));
        assert!(matches!(
            parse_skill("---\nname: x\n---\n", path),
            Err(SkillParseError::MissingField("description"))
        ));
        assert!(matches!(
            parse_skill("---\nname: [unclosed\n---\n", path),
            Err(SkillParseError::Yaml(_))
        ));
    }

    #[test]
    fn load_skips_invalid_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "zeta", "---\nname: zeta\ndescription: last\n---\n");
        write_skill(tmp.path(), "alpha", "---\nname: alpha\ndescription: first\n---\n");
        write_skill(tmp.path(), "broken", "no frontmatter here");
        std::fs::create_dir_all(tmp.path().join("empty-dir")).unwrap();
        std::fs::write(tmp.path().join("README.md"), "not a skill").unwrap();

        let catalog = SkillCatalog::load(tmp.path());
        let names: Vec<&str> = catalog.skills().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let catalog = SkillCatalog::load(Path::new("/nonexistent/skills/dir"));
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn install_copies_skill_trees_into_project() {
        let source = tempfile::tempdir().unwrap();
        write_skill(source.path(), "sdp", "---\nname: sdp\ndescription: pipelines\n---\n# v2\n");
        std::fs::create_dir_all(source.path().join("sdp/templates")).unwrap();
        std::fs::write(source.path().join("sdp/templates/job.yml"), "resources: {}").unwrap();
        let catalog = SkillCatalog::load(source.path());

        let project = tempfile::tempdir().unwrap();
        let installed = project.path().join(".claude/skills/sdp");
        std::fs::create_dir_all(&installed).unwrap();
        std::fs::write(installed.join(SKILL_FILE), "stale").unwrap();
        std::fs::write(installed.join("notes.md"), "kept").unwrap();

        catalog.install_into(project.path()).await.unwrap();

        let skill_md = std::fs::read_to_string(installed.join(SKILL_FILE)).unwrap();
        assert!(skill_md.ends_with("# v2\n"));
        assert_eq!(
            std::fs::read_to_string(installed.join("templates/job.yml")).unwrap(),
            "resources: {}"
        );
        assert_eq!(std::fs::read_to_string(installed.join("notes.md")).unwrap(), "kept");
    }

    #[tokio::test]
    async fn empty_catalog_installs_nothing() {
        let project = tempfile::tempdir().unwrap();
        SkillCatalog::default().install_into(project.path()).await.unwrap();
        assert!(!project.path().join(".claude").exists());
    }
}
