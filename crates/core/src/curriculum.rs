//! The competency graph: curricula, modules and competencies.
//!
//! A curriculum revision is static once registered. Modules are ordered and flagged required or
//! optional; each competency belongs to exactly one module of the revision.

use crate::error::{CoreError, CoreResult};
use crate::ids::{CompetencyId, CurriculumId, ModuleId};
use nwd_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub id: CompetencyId,
    pub title: NonEmptyText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub title: NonEmptyText,
    pub required: bool,
    pub competencies: Vec<Competency>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curriculum {
    pub id: CurriculumId,
    pub title: NonEmptyText,
    pub revision: u32,
    pub modules: Vec<Module>,
}

impl Curriculum {
    /// Checks the structural invariants of a revision.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] when the curriculum has no modules, a module has no
    /// competencies, or a module or competency id appears more than once.
    pub fn validate(&self) -> CoreResult<()> {
        if self.modules.is_empty() {
            return Err(CoreError::InvalidInput(
                "curriculum must contain at least one module".into(),
            ));
        }

        let mut modules = HashSet::new();
        let mut competencies = HashSet::new();
        for module in &self.modules {
            if !modules.insert(module.id) {
                return Err(CoreError::InvalidInput(format!(
                    "module {} appears more than once",
                    module.id
                )));
            }
            if module.competencies.is_empty() {
                return Err(CoreError::InvalidInput(format!(
                    "module {} has no competencies",
                    module.id
                )));
            }
            for competency in &module.competencies {
                if !competencies.insert(competency.id) {
                    return Err(CoreError::InvalidInput(format!(
                        "competency {} belongs to more than one module",
                        competency.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn module_of(&self, competency: CompetencyId) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| m.competencies.iter().any(|c| c.id == competency))
    }

    pub fn contains_competency(&self, competency: CompetencyId) -> bool {
        self.module_of(competency).is_some()
    }

    pub fn required_modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter().filter(|m| m.required)
    }

    /// Every competency of every required module, in curriculum order.
    pub fn core_competencies(&self) -> impl Iterator<Item = CompetencyId> + '_ {
        self.required_modules()
            .flat_map(|m| m.competencies.iter().map(|c| c.id))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Two required modules (3 + 2 competencies) and one optional module (1 competency).
    pub(crate) fn sample_curriculum() -> Curriculum {
        let text = |s: &str| NonEmptyText::new(s).unwrap();
        let module = |title: &str, required: bool, n: usize| Module {
            id: ModuleId::new(),
            title: text(title),
            required,
            competencies: (0..n)
                .map(|i| Competency {
                    id: CompetencyId::new(),
                    title: text(&format!("{title} {i}")),
                })
                .collect(),
        };

        Curriculum {
            id: CurriculumId::new(),
            title: text("Zwaardboot 1-mans"),
            revision: 1,
            modules: vec![
                module("Varen", true, 3),
                module("Veiligheid", true, 2),
                module("Wedstrijd", false, 1),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_curriculum;
    use super::*;

    #[test]
    fn sample_is_valid() {
        sample_curriculum().validate().unwrap();
    }

    #[test]
    fn rejects_competency_in_two_modules() {
        let mut curriculum = sample_curriculum();
        let shared = curriculum.modules[0].competencies[0].clone();
        curriculum.modules[1].competencies.push(shared);

        let err = curriculum.validate().unwrap_err();
        assert!(
            matches!(err, CoreError::InvalidInput(msg) if msg.contains("more than one module"))
        );
    }

    #[test]
    fn rejects_empty_curriculum() {
        let mut curriculum = sample_curriculum();
        curriculum.modules.clear();
        assert!(curriculum.validate().is_err());
    }

    #[test]
    fn core_competencies_cover_required_modules_only() {
        let curriculum = sample_curriculum();
        assert_eq!(curriculum.core_competencies().count(), 5);
        let optional = curriculum.modules[2].competencies[0].id;
        assert!(curriculum.core_competencies().all(|c| c != optional));
        assert_eq!(curriculum.module_of(optional).map(|m| m.required), Some(false));
    }
}
