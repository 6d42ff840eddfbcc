//! Structural checks over a `PassPlan` before any graph is touched.
use std::collections::BTreeSet;

use shadergraph::Scene;

use crate::PassPlan;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("pass #{pass}: object '{object}' does not exist")]
    UnknownObject { pass: usize, object: String },
    #[error("pass #{pass} has no instructions")]
    EmptyPass { pass: usize },
    #[error("pass #{pass}: UV map '{uv_map}' not found on object '{object}' (material '{material}')")]
    MissingUvMap {
        pass: usize,
        object: String,
        material: String,
        uv_map: String,
    },
    #[error("pass #{pass}: material '{material}' is not assigned to object '{object}'")]
    ForeignMaterial {
        pass: usize,
        object: String,
        material: String,
    },
    #[error("pass #{pass}: material '{material}' of object '{object}' is missing from the pass")]
    MissingMaterial {
        pass: usize,
        object: String,
        material: String,
    },
    #[error("pass #{pass}: object '{object}' would need UV maps {uv_maps:?} in a single bake")]
    MixedUvMaps {
        pass: usize,
        object: String,
        uv_maps: Vec<String>,
    },
    #[error("'{object}' -> '{material}' -> '{input}' is baked more than once")]
    DuplicateInstruction {
        object: String,
        material: String,
        input: String,
    },
}

impl PassPlan {
    pub fn validate(&self, scene: &Scene) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut baked = BTreeSet::new();

        for pass in &self.passes {
            if pass.instructions.is_empty() {
                issues.push(ValidationIssue::EmptyPass { pass: pass.index });
            }

            let Some(object) = scene.object(&pass.object) else {
                issues.push(ValidationIssue::UnknownObject {
                    pass: pass.index,
                    object: pass.object.clone(),
                });
                continue;
            };
            let slots = object.materials();

            for instruction in &pass.instructions {
                if !slots.contains(&instruction.material.as_str()) {
                    issues.push(ValidationIssue::ForeignMaterial {
                        pass: pass.index,
                        object: object.name.clone(),
                        material: instruction.material.clone(),
                    });
                    continue;
                }
                if instruction.is_dummy() {
                    continue;
                }
                if let Some(uv_map) = &instruction.uv_map {
                    if !object.has_uv_layer(uv_map) {
                        issues.push(ValidationIssue::MissingUvMap {
                            pass: pass.index,
                            object: object.name.clone(),
                            material: instruction.material.clone(),
                            uv_map: uv_map.clone(),
                        });
                    }
                }
            }

            let present = pass.materials();
            for material in &slots {
                if !present.contains(material) {
                    issues.push(ValidationIssue::MissingMaterial {
                        pass: pass.index,
                        object: object.name.clone(),
                        material: material.to_string(),
                    });
                }
            }

            let uv_maps: BTreeSet<&str> = pass
                .real_instructions()
                .filter_map(|instruction| instruction.uv_map.as_deref())
                .collect();
            if uv_maps.len() > 1 {
                issues.push(ValidationIssue::MixedUvMaps {
                    pass: pass.index,
                    object: object.name.clone(),
                    uv_maps: uv_maps.into_iter().map(str::to_string).collect(),
                });
            }
        }

        for pass in &self.passes {
            for instruction in pass.real_instructions() {
                let Some(input) = instruction.input() else {
                    continue;
                };
                let key = (
                    pass.object.as_str(),
                    instruction.material.as_str(),
                    input,
                );
                if !baked.insert(key) {
                    issues.push(ValidationIssue::DuplicateInstruction {
                        object: pass.object.clone(),
                        material: instruction.material.clone(),
                        input: input.to_string(),
                    });
                }
            }
        }

        issues
    }
}
