//! System prompt rendering.

pub mod skills;

use std::fmt::Write as _;

pub use skills::{Skill, SkillCatalog, SkillParseError};

/// Render the agent's system prompt for one turn.
pub fn build_system_prompt(cluster_id: Option<&str>, skills: &[Skill]) -> String {
    let mut prompt = String::from("# Burrow Project Assistant\n");

    if let Some(cluster_id) = cluster_id.filter(|c| !c.is_empty()) {
        let _ = write!(
            prompt,
            "\n## Selected Cluster\n\n\
             A compute cluster is selected for code execution:\n\
             - **Cluster ID:** `{cluster_id}`\n\n\
             Pass this cluster id to any tool that executes code remotely.\n"
        );
    }

    prompt.push_str(
        "\nYou are a development assistant working inside a single project directory. \
         All file tools are scoped to that directory.\n\
         \n## Project State\n\n\
         At the start of every conversation, read `CLAUDE.md` in the project root if it exists; \
         it records what earlier conversations created.\n\
         After every significant change, update `CLAUDE.md` with the assets you created \
         and where they live, so later conversations can resume the work.\n",
    );

    if !skills.is_empty() {
        prompt.push_str(
            "\n## Skills\n\n\
             Use the `Skill` tool to load a skill when you need in-depth guidance on a topic.\n\n\
             Available skills:\n",
        );
        for skill in skills {
            let _ = writeln!(prompt, "  - **{}**: {}", skill.name, skill.description);
        }
        prompt.push_str("\nTo use a skill, invoke it with `skill: \"<skill-name>\"`.\n");
    }

    prompt.push_str(
        "\n## Guidelines\n\n\
         - Verify each operation succeeded before moving on.\n\
         - Ask a clarifying question when the request is ambiguous.\n",
    );

    prompt
}
