//! Sequential lesson unlocking. Pure: course ordering and the learner's
//! completion set come in as arguments, capability flags are caller-supplied.

use std::collections::HashSet;

use serde::Serialize;

use crate::services::progress::LessonRef;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonAccess {
    pub lesson_id: String,
    pub title: String,
    pub accessible: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAccess {
    pub module_id: String,
    pub lessons: Vec<LessonAccess>,
    pub quiz_accessible: bool,
    pub module_complete: bool,
}

/// Lesson 0 is always accessible. Lesson i > 0 is accessible when its
/// predecessor is completed, or when it is itself completed (review access).
pub fn resolve_lesson_access(
    lessons: &[LessonRef],
    completed: &HashSet<String>,
    bypass_gating: bool,
) -> Vec<LessonAccess> {
    lessons
        .iter()
        .enumerate()
        .map(|(i, lesson)| {
            let is_completed = completed.contains(&lesson.id);
            let accessible = bypass_gating
                || i == 0
                || is_completed
                || completed.contains(&lessons[i - 1].id);
            LessonAccess {
                lesson_id: lesson.id.clone(),
                title: lesson.title.clone(),
                accessible,
                completed: is_completed,
            }
        })
        .collect()
}

/// The gating quiz opens once every lesson in the module is completed.
/// An empty module is vacuously complete.
pub fn quiz_gate_open(
    lessons: &[LessonRef],
    completed: &HashSet<String>,
    bypass_gating: bool,
) -> bool {
    bypass_gating || lessons.iter().all(|lesson| completed.contains(&lesson.id))
}

pub fn resolve_module_access(
    module_id: &str,
    lessons: &[LessonRef],
    completed: &HashSet<String>,
    bypass_gating: bool,
) -> ModuleAccess {
    let module_complete = lessons.iter().all(|lesson| completed.contains(&lesson.id));
    ModuleAccess {
        module_id: module_id.to_string(),
        quiz_accessible: quiz_gate_open(lessons, completed, bypass_gating),
        lessons: resolve_lesson_access(lessons, completed, bypass_gating),
        module_complete,
    }
}
