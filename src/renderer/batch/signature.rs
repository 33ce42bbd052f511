use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::renderer::Shader;

struct Entry<V> {
    value: Arc<V>,
    users: Vec<Weak<Shader>>,
}

/// Indirect-draw signatures keyed by the shader's batch bind-group slot.
///
/// Shaders that put their batch bindings in the same slot share one
/// signature. An entry lives while at least one of its shaders does.
pub struct SignatureCache<V> {
    entries: HashMap<u32, Entry<V>>,
}

impl<V> SignatureCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_create(&mut self, shader: &Arc<Shader>, make: impl FnOnce(u32) -> V) -> Arc<V> {
        let slot = shader.batch_slot();
        let entry = self.entries.entry(slot).or_insert_with(|| {
            log::debug!("Creating batch signature for slot {}", slot);
            Entry {
                value: Arc::new(make(slot)),
                users: Vec::new(),
            }
        });

        if !entry
            .users
            .iter()
            .any(|user| user.as_ptr() == Arc::as_ptr(shader))
        {
            entry.users.push(Arc::downgrade(shader));
        }

        Arc::clone(&entry.value)
    }

    /// Drops signatures whose shaders have all been destroyed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.users.retain(|user| user.strong_count() > 0);
            !entry.users.is_empty()
        });
        before - self.entries.len()
    }
}

impl<V> Default for SignatureCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind group layouts shared by every batch pipeline.
pub struct BatchLayouts {
    pub view: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub batch: wgpu::BindGroupLayout,
}

impl BatchLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform = |label: &'static str, visibility: wgpu::ShaderStages| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            })
        };
        let storage = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        Self {
            view: uniform(
                "BatchViewBindLayout",
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ),
            material: uniform("BatchMaterialBindLayout", wgpu::ShaderStages::FRAGMENT),
            batch: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("BatchStorageBindLayout"),
                entries: &[storage(0), storage(1)],
            }),
        }
    }
}

/// Pipeline layout with the batch bindings at `slot`, the view at group 0
/// and the material in the remaining group.
pub struct BatchSignature {
    pub slot: u32,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl BatchSignature {
    pub fn new(device: &wgpu::Device, layouts: &BatchLayouts, slot: u32) -> Self {
        let mut groups = [&layouts.view, &layouts.material, &layouts.material];
        groups[slot.clamp(1, 2) as usize] = &layouts.batch;

        Self {
            slot,
            pipeline_layout: device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("BatchPipelineLayout"),
                bind_group_layouts: &groups,
                push_constant_ranges: &[],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaders_with_the_same_slot_share_a_signature() {
        let mut cache = SignatureCache::new();
        let a = Arc::new(Shader::lit());
        let b = Arc::new(Shader::lit());
        let shadow = Arc::new(Shader::shadow());
        let mut created = 0;

        let sig_a = cache.get_or_create(&a, |slot| {
            created += 1;
            slot
        });
        let sig_b = cache.get_or_create(&b, |slot| {
            created += 1;
            slot
        });
        let sig_shadow = cache.get_or_create(&shadow, |slot| {
            created += 1;
            slot
        });

        assert!(Arc::ptr_eq(&sig_a, &sig_b));
        assert_eq!(*sig_shadow, 1);
        assert_eq!(created, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn prune_keeps_entries_with_a_live_shader() {
        let mut cache = SignatureCache::new();
        let a = Arc::new(Shader::lit());
        let b = Arc::new(Shader::lit());
        let shadow = Arc::new(Shader::shadow());
        cache.get_or_create(&a, |slot| slot);
        cache.get_or_create(&b, |slot| slot);
        cache.get_or_create(&shadow, |slot| slot);

        drop(a);
        drop(shadow);
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 1);

        drop(b);
        assert_eq!(cache.prune(), 1);
        assert!(cache.is_empty());
    }
}
