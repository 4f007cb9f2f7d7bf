use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::MAX_LAYER_RETRIES;
use crate::media::MediaGenerator;
use crate::models::Map;
use crate::{Result, SpiralError};

#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub label: String,
    pub entity_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AnchorEntity {
    pub entity_id: String,
    pub entity_type: String,
    pub prompt_summary: String,
    pub name: String,
    pub description: String,
    pub blueprint_text: String,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub scene_id: String,
    pub prompt: String,
    /// entity ids (characters, props) that must have a scene-level anchor.
    pub stability_keyframes: Vec<String>,
    /// entity id of this scene's single location anchor, if any. Flows
    /// through L1/L1.5/L2 like any other entity; L3 looks it up by this id
    /// rather than by `scene_id`.
    pub location_entity_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Shot {
    pub shot_id: String,
    pub scene_id: String,
    pub prompt: String,
    pub characters_in_frame: Vec<String>,
    pub props_in_frame: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeyframePlan {
    pub global_anchors: Vec<AnchorEntity>,
    pub scenes: Vec<Scene>,
    pub shots: Vec<Shot>,
    pub references: Vec<ReferenceImage>,
    pub style_guide: Option<String>,
    pub visual_style: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedKeyframe {
    pub key: String,
    pub data: Vec<u8>,
}

/// Three-layer post-LLM image generation: global anchors (L1, backfilled by
/// L1.5) -> scene anchors (L2) -> shot keyframes (L3), each layer fully
/// parallel internally and separated by a wait-all barrier from the next.
/// Grounded on `agents/keyframe/materializer.py`.
pub struct MaterializationRuntime {
    media: Arc<dyn MediaGenerator>,
    max_retries: u32,
}

impl MaterializationRuntime {
    pub fn new(media: Arc<dyn MediaGenerator>) -> Self {
        Self {
            media,
            max_retries: MAX_LAYER_RETRIES,
        }
    }

    /// `assets["style_guide"]`/`assets["visual_style"]` are appended to
    /// every generation prompt, per SPEC_FULL.md §5.
    pub fn build_style_suffix(plan: &KeyframePlan) -> String {
        let mut parts = Vec::new();
        if let Some(style) = &plan.style_guide {
            parts.push(style.clone());
        }
        if let Some(style) = &plan.visual_style {
            parts.push(style.clone());
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(", {}", parts.join(", "))
        }
    }

    /// L0: matches user-provided reference images onto global anchor
    /// entities by type bucket, then case-insensitive substring of the
    /// label against entity text fields. Ambiguous matches (no keyword hit,
    /// more than one candidate in bucket) are skipped, not guessed.
    fn match_references(plan: &KeyframePlan) -> HashMap<String, Vec<u8>> {
        let mut satisfied = HashMap::new();

        for reference in &plan.references {
            let bucket: Vec<&AnchorEntity> = plan
                .global_anchors
                .iter()
                .filter(|e| e.entity_type == reference.entity_type)
                .collect();

            let label = reference.label.to_lowercase();
            let keyword_match = bucket.iter().find(|e| {
                label.contains(&e.entity_id.to_lowercase())
                    || label.contains(&e.prompt_summary.to_lowercase())
                    || label.contains(&e.name.to_lowercase())
                    || label.contains(&e.description.to_lowercase())
                    || label.contains(&e.blueprint_text.to_lowercase())
            });

            let bound = match keyword_match {
                Some(entity) => Some(*entity),
                None if bucket.len() == 1 => Some(bucket[0]),
                None => {
                    tracing::warn!(label = %reference.label, "reference image did not match a unique global anchor; skipping");
                    None
                }
            };

            if let Some(entity) = bound {
                satisfied.insert(entity.entity_id.clone(), reference.data.clone());
            }
        }

        satisfied
    }

    /// Shared fan-out-with-retry used by L1/L1.5/L2: each pending key is
    /// retried independently until it succeeds; the layer as a whole fails
    /// after `max_retries` full passes if any key never succeeds.
    async fn generate_layer<F, Fut>(
        &self,
        label: &str,
        mut pending: Vec<String>,
        call: F,
    ) -> Result<HashMap<String, Vec<u8>>>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>>>,
    {
        let mut done = HashMap::new();

        for attempt in 0..self.max_retries {
            if pending.is_empty() {
                break;
            }

            let futures = pending
                .iter()
                .cloned()
                .map(|key| {
                    let fut = call(key.clone());
                    async move { (key, fut.await) }
                })
                .collect::<Vec<_>>();

            let results = futures::future::join_all(futures).await;
            let mut still_pending = Vec::new();
            for (key, result) in results {
                match result {
                    Ok(bytes) => {
                        done.insert(key, bytes);
                    }
                    Err(e) => {
                        tracing::debug!(key = %key, attempt, error = %e, "materialization attempt failed, will retry");
                        still_pending.push(key);
                    }
                }
            }
            pending = still_pending;

            if !pending.is_empty() {
                let backoff_ms = 50u64 * 2u64.pow(attempt.min(6));
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
            }
        }

        if !pending.is_empty() {
            return Err(SpiralError::AssetFailure(format!(
                "{label} layer failed to materialize after {} passes: {:?}",
                self.max_retries, pending
            )));
        }
        Ok(done)
    }

    pub async fn run(&self, plan: &KeyframePlan) -> Result<Vec<GeneratedKeyframe>> {
        let style_suffix = Self::build_style_suffix(plan);

        // L0
        let mut global_anchor_bytes = Self::match_references(plan);

        // L1
        let unmatched: Vec<String> = plan
            .global_anchors
            .iter()
            .map(|e| e.entity_id.clone())
            .filter(|id| !global_anchor_bytes.contains_key(id))
            .collect();

        let prompts: HashMap<String, String> = plan
            .global_anchors
            .iter()
            .map(|e| (e.entity_id.clone(), format!("{}{}", e.prompt_summary, style_suffix)))
            .collect();

        let media = self.media.clone();
        let prompts_for_l1 = prompts.clone();
        let l1_results = self
            .generate_layer("L1 global anchors", unmatched, move |entity_id| {
                let media = media.clone();
                let prompt = prompts_for_l1.get(&entity_id).cloned().unwrap_or_default();
                async move { media.generate(&prompt).await }
            })
            .await?;
        global_anchor_bytes.extend(l1_results);

        // L1.5 backfill: scene entities (characters, props, location) missing
        // from global anchors.
        let mut scene_entity_ids: Vec<String> = Vec::new();
        for scene in &plan.scenes {
            for entity_id in scene.stability_keyframes.iter().chain(scene.location_entity_id.iter()) {
                if !global_anchor_bytes.contains_key(entity_id)
                    && !scene_entity_ids.contains(entity_id)
                {
                    scene_entity_ids.push(entity_id.clone());
                }
            }
        }

        if !scene_entity_ids.is_empty() {
            let media = self.media.clone();
            let suffix = style_suffix.clone();
            let backfilled = self
                .generate_layer("L1.5 backfill", scene_entity_ids, move |entity_id| {
                    let media = media.clone();
                    let prompt = format!("{entity_id}{suffix}");
                    async move { media.generate(&prompt).await }
                })
                .await?;
            global_anchor_bytes.extend(backfilled);
        }

        // L2: scene anchors, edit seeded from each entity's L1 bytes.
        let mut scene_anchor_bytes: HashMap<String, Vec<u8>> = HashMap::new();
        let mut l2_keys = Vec::new();
        let mut l2_refs: HashMap<String, Vec<u8>> = HashMap::new();
        let mut l2_prompts: HashMap<String, String> = HashMap::new();
        for scene in &plan.scenes {
            for entity_id in scene.stability_keyframes.iter().chain(scene.location_entity_id.iter()) {
                let key = format!("{}::{}", scene.scene_id, entity_id);
                if let Some(bytes) = global_anchor_bytes.get(entity_id) {
                    l2_refs.insert(key.clone(), bytes.clone());
                    l2_prompts.insert(key.clone(), scene.prompt.clone());
                    l2_keys.push(key);
                }
            }
        }

        let media = self.media.clone();
        let l2_results = self
            .generate_layer("L2 scene anchors", l2_keys, move |key| {
                let media = media.clone();
                let refs = l2_refs.get(&key).cloned().unwrap_or_default();
                let prompt = l2_prompts.get(&key).cloned().unwrap_or_default();
                async move { media.edit(&prompt, &[refs]).await }
            })
            .await?;
        scene_anchor_bytes.extend(l2_results);

        // L3: shot keyframes, edit seeded from L2 refs for characters,
        // location, and props in frame. Fatal if a shot has no L2 refs.
        let mut generated = Vec::new();
        for shot in &plan.shots {
            let mut refs = Vec::new();
            for entity_id in shot.characters_in_frame.iter().chain(shot.props_in_frame.iter()) {
                let key = format!("{}::{}", shot.scene_id, entity_id);
                if let Some(bytes) = scene_anchor_bytes.get(&key) {
                    refs.push(bytes.clone());
                }
            }
            let scene = plan.scenes.iter().find(|s| s.scene_id == shot.scene_id);
            if let Some(location_entity_id) = scene.and_then(|s| s.location_entity_id.as_ref()) {
                let location_key = format!("{}::{}", shot.scene_id, location_entity_id);
                if let Some(bytes) = scene_anchor_bytes.get(&location_key) {
                    refs.push(bytes.clone());
                }
            }

            if refs.is_empty() {
                return Err(SpiralError::AssetFailure(format!(
                    "shot {} has no L2 scene-anchor references to seed from",
                    shot.shot_id
                )));
            }

            let bytes = self.media.edit(&shot.prompt, &refs).await?;
            generated.push(GeneratedKeyframe {
                key: shot.shot_id.clone(),
                data: bytes,
            });
        }

        Ok(generated)
    }
}

pub fn asset_key_for_shot(shot_id: &str) -> String {
    format!("keyframe_{shot_id}")
}

/// Returned results keyed the way `AssistantService::process_results`
/// expects: top-level keys whose value is a `{file_content, ...}` record.
pub fn results_to_asset_map(generated: &[GeneratedKeyframe]) -> Map {
    let mut map = Map::new();
    for keyframe in generated {
        map.insert(
            asset_key_for_shot(&keyframe.key),
            serde_json::json!({
                "filename": format!("{}.png", keyframe.key),
                "description": format!("keyframe for shot {}", keyframe.key),
            }),
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NullMediaGenerator;

    fn small_plan() -> KeyframePlan {
        KeyframePlan {
            global_anchors: vec![AnchorEntity {
                entity_id: "hero".to_string(),
                entity_type: "character".to_string(),
                prompt_summary: "a weary detective".to_string(),
                name: "Detective".to_string(),
                description: "".to_string(),
                blueprint_text: "".to_string(),
            }],
            scenes: vec![Scene {
                scene_id: "scene_1".to_string(),
                prompt: "rain-soaked alley at night".to_string(),
                stability_keyframes: vec!["hero".to_string()],
                location_entity_id: None,
            }],
            shots: vec![Shot {
                shot_id: "shot_1".to_string(),
                scene_id: "scene_1".to_string(),
                prompt: "detective walks into frame".to_string(),
                characters_in_frame: vec!["hero".to_string()],
                props_in_frame: vec![],
            }],
            references: vec![],
            style_guide: Some("noir".to_string()),
            visual_style: None,
        }
    }

    #[tokio::test]
    async fn full_pipeline_produces_one_keyframe_per_shot() {
        let runtime = MaterializationRuntime::new(Arc::new(NullMediaGenerator));
        let generated = runtime.run(&small_plan()).await.unwrap();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].key, "shot_1");
    }

    /// The scene's location entity must flow through L1/L1.5/L2 like any
    /// other entity, and L3 must find it by its own entity id rather than
    /// the scene id.
    #[tokio::test]
    async fn shot_references_include_the_scene_location_anchor() {
        let mut plan = small_plan();
        plan.global_anchors.push(AnchorEntity {
            entity_id: "alley".to_string(),
            entity_type: "location".to_string(),
            prompt_summary: "a rain-soaked alley".to_string(),
            name: "Alley".to_string(),
            description: String::new(),
            blueprint_text: String::new(),
        });
        plan.scenes[0].location_entity_id = Some("alley".to_string());
        // Only the location anchor seeds this shot; no characters/props.
        plan.shots[0].characters_in_frame.clear();

        let media = Arc::new(CountingMediaGenerator {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let runtime = MaterializationRuntime::new(media);
        let generated = runtime.run(&plan).await.unwrap();
        assert_eq!(generated.len(), 1);
        let text = String::from_utf8(generated[0].data.clone()).unwrap();
        assert!(text.contains("refs=1"), "expected the location reference to be passed to the L3 edit call: {text}");
    }

    #[tokio::test]
    async fn shot_with_no_l2_reference_is_fatal() {
        let mut plan = small_plan();
        plan.shots[0].characters_in_frame.clear();
        plan.scenes[0].stability_keyframes.clear();

        let runtime = MaterializationRuntime::new(Arc::new(NullMediaGenerator));
        let result = runtime.run(&plan).await;
        assert!(result.is_err());
    }

    #[test]
    fn style_suffix_combines_guide_and_visual_style() {
        let mut plan = small_plan();
        plan.visual_style = Some("35mm film grain".to_string());
        let suffix = MaterializationRuntime::build_style_suffix(&plan);
        assert!(suffix.contains("noir"));
        assert!(suffix.contains("35mm film grain"));
    }

    struct CountingMediaGenerator {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl crate::media::MediaGenerator for CountingMediaGenerator {
        async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(format!("generated:{prompt}").into_bytes())
        }

        async fn edit(&self, prompt: &str, references: &[Vec<u8>]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(format!("edited:{prompt}:refs={}", references.len()).into_bytes())
        }
    }

    /// 10 global anchors + 3 scenes x 5 stability keyframes + 20 shots must
    /// never exceed 45 total adapter calls: one `generate` per global anchor
    /// (no L1.5 backfill needed, since every scene keyframe is already a
    /// global anchor), one `edit` per scene anchor, one `edit` per shot.
    #[tokio::test]
    async fn materialization_stays_within_adapter_call_budget() {
        let entity_ids: Vec<String> = (0..10).map(|i| format!("e{i}")).collect();
        let global_anchors: Vec<AnchorEntity> = entity_ids
            .iter()
            .map(|id| AnchorEntity {
                entity_id: id.clone(),
                entity_type: "character".to_string(),
                prompt_summary: format!("entity {id}"),
                name: id.clone(),
                description: String::new(),
                blueprint_text: String::new(),
            })
            .collect();

        let scene_keyframes: Vec<String> = entity_ids[..5].to_vec();
        let scenes: Vec<Scene> = (0..3)
            .map(|i| Scene {
                scene_id: format!("scene_{i}"),
                prompt: format!("scene {i}"),
                stability_keyframes: scene_keyframes.clone(),
                location_entity_id: None,
            })
            .collect();

        let shots: Vec<Shot> = (0..20)
            .map(|i| {
                let scene_id = format!("scene_{}", i % 3);
                Shot {
                    shot_id: format!("shot_{i}"),
                    scene_id,
                    prompt: format!("shot {i}"),
                    characters_in_frame: vec!["e0".to_string()],
                    props_in_frame: vec![],
                }
            })
            .collect();

        let plan = KeyframePlan {
            global_anchors,
            scenes,
            shots,
            references: vec![],
            style_guide: None,
            visual_style: None,
        };

        let media = Arc::new(CountingMediaGenerator {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let runtime = MaterializationRuntime::new(media.clone());
        let generated = runtime.run(&plan).await.unwrap();

        assert_eq!(generated.len(), 20);
        let total_calls = media.calls.load(std::sync::atomic::Ordering::SeqCst);
        assert!(total_calls <= 45, "expected at most 45 adapter calls, got {total_calls}");
        assert_eq!(total_calls, 10 + 3 * 5 + 20);
    }
}
