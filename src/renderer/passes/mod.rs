//! Material Passes
//!
//! A pass is one draw of a renderable with one program. Every pass shares
//! [`PassState`] (blend, depth, culling, lighting budgets, effects, owners)
//! and picks its code-emitting behaviour from the closed [`PassKind`] set:
//!
//! - [`AmbientShading`]: unlit colour or texture
//! - [`LightingShading`]: Lambert + Blinn-Phong over a light picker
//!
//! Code emission goes through the [`ShadingHooks`] capability; the compiler
//! drives the hooks in a fixed order and threads a [`CompilationContext`]
//! through them. Render-state hooks ([`MaterialPass::activate`],
//! [`MaterialPass::set_render_state`], [`MaterialPass::deactivate`]) run
//! against a [`RenderContext`] once per frame.
//!
//! Passes never point back at their owners' compiled state. Each change
//! bumps the pass version; compiled state stores the version it was built
//! from and recompiles on mismatch.

pub mod ambient;
pub mod color_transform;
pub mod lighting;

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use glam::Mat3;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::assets::{AssetServer, LightPickerHandle, MaterialHandle, PassHandle, TextureHandle};
use crate::errors::{Result, StageError};
use crate::renderer::core::backend::Backend;
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::state::{BlendFactor, CompareMode, TriangleFace, VertexBufferFormat};
use crate::renderer::pipeline::compiler::CompilationContext;
use crate::renderer::pipeline::registers::RegisterHandle;
use crate::renderer::pipeline::sampling::SamplerSettings;
use crate::renderer::pipeline::shader_object::ShaderObject;
use crate::renderer::settings::StageSettings;
use crate::resources::light_picker::LightPicker;
use crate::resources::version_tracker::ChangeTracker;
use crate::scene::{Camera, Renderable};

pub use ambient::AmbientShading;
pub use color_transform::ColorTransform;
pub use lighting::LightingShading;

// ============================================================================
// Blend Modes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Layer,
    Multiply,
    Add,
    Alpha,
}

impl BlendMode {
    /// `(source, destination)` blend factors.
    #[must_use]
    pub const fn factors(self) -> (BlendFactor, BlendFactor) {
        match self {
            Self::Normal => (BlendFactor::One, BlendFactor::Zero),
            Self::Layer => (BlendFactor::SourceAlpha, BlendFactor::OneMinusSourceAlpha),
            Self::Multiply => (BlendFactor::Zero, BlendFactor::SourceColor),
            Self::Add => (BlendFactor::SourceAlpha, BlendFactor::One),
            Self::Alpha => (BlendFactor::Zero, BlendFactor::SourceAlpha),
        }
    }

    #[inline]
    #[must_use]
    pub const fn enables_blending(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl FromStr for BlendMode {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "layer" => Ok(Self::Layer),
            "multiply" => Ok(Self::Multiply),
            "add" => Ok(Self::Add),
            "alpha" => Ok(Self::Alpha),
            _ => Err(StageError::UnknownBlendMode(s.to_owned())),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Layer => "layer",
            Self::Multiply => "multiply",
            Self::Add => "add",
            Self::Alpha => "alpha",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Which optional stages a pass runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassMode: u8 {
        const EFFECTS = 0x01;
        const LIGHTING = 0x02;
    }
}

impl Default for PassMode {
    fn default() -> Self {
        Self::EFFECTS | Self::LIGHTING
    }
}

// ============================================================================
// Light Counts
// ============================================================================

/// Per-class light numbers: either counts a pass shades with or offsets into
/// the picker's lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LightCounts {
    pub directional: u32,
    pub point: u32,
    pub probes: u32,
}

impl LightCounts {
    #[inline]
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.directional + self.point + self.probes
    }
}

/// Snapshot of a light picker's list lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PickerCounts {
    pub directional: u32,
    pub point: u32,
    pub casting_directional: u32,
    pub casting_point: u32,
    pub probes: u32,
}

impl PickerCounts {
    #[must_use]
    pub fn of(picker: &LightPicker) -> Self {
        Self {
            directional: picker.num_directional_lights(),
            point: picker.num_point_lights(),
            casting_directional: picker.num_casting_directional_lights(),
            casting_point: picker.num_casting_point_lights(),
            probes: picker.num_light_probes(),
        }
    }
}

// ============================================================================
// Owners & Hook Plumbing
// ============================================================================

/// Key of one compiled instance of a pass: the pass as used by one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassOwner {
    pub pass: PassHandle,
    pub material: MaterialHandle,
}

impl PassOwner {
    #[inline]
    #[must_use]
    pub const fn new(pass: PassHandle, material: MaterialHandle) -> Self {
        Self { pass, material }
    }
}

#[derive(Debug, Clone, Default)]
struct PassOwnerRecord {
    tracker: ChangeTracker,
}

/// Read-only inputs available to [`ShadingHooks::activate`].
#[derive(Debug, Clone, Copy)]
pub struct ActivationEnv<'a> {
    pub camera: &'a Camera,
    pub light_picker: Option<&'a LightPicker>,
}

/// A texture a pass binds on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub slot: u32,
    pub texture: TextureHandle,
    pub sampler: SamplerSettings,
}

/// Code-emission and constant hooks every pass variant provides.
///
/// All code hooks default to empty output.
pub trait ShadingHooks {
    /// Bumps the dependency counters of the derived values this pass reads.
    fn include_dependencies(&self, _state: &PassState, _shader: &mut ShaderObject) {}

    fn pre_vertex_code(&self, _state: &PassState, _cx: &mut CompilationContext) -> Result<String> {
        Ok(String::new())
    }

    fn vertex_code(&self, _state: &PassState, _cx: &mut CompilationContext) -> Result<String> {
        Ok(String::new())
    }

    /// Fragment code writing the per-fragment normal. Empty output keeps the
    /// default renormalised varying.
    fn normal_fragment_code(&self, _state: &PassState, _cx: &mut CompilationContext) -> Result<String> {
        Ok(String::new())
    }

    /// Fragment code writing the pass colour into `target`.
    fn fragment_code(
        &self,
        _state: &PassState,
        _cx: &mut CompilationContext,
        _target: RegisterHandle,
    ) -> Result<String> {
        Ok(String::new())
    }

    /// Constants that stay fixed for the lifetime of the compiled object.
    fn init_constant_data(&self, _state: &PassState, _shader: &mut ShaderObject) {}

    /// Per-activation constants.
    fn activate(&self, _state: &PassState, _shader: &mut ShaderObject, _env: &ActivationEnv<'_>) {}
}

/// The closed set of pass variants.
#[derive(Debug, Clone)]
pub enum PassKind {
    Ambient(AmbientShading),
    Lighting(LightingShading),
}

impl PassKind {
    /// Version of the variant's code-shaping properties.
    #[must_use]
    pub fn code_version(&self) -> u64 {
        match self {
            Self::Ambient(a) => a.code_version(),
            Self::Lighting(l) => l.code_version(),
        }
    }

    /// Every texture the variant may sample.
    #[must_use]
    pub fn textures(&self) -> SmallVec<[TextureHandle; 2]> {
        match self {
            Self::Ambient(a) => a.texture().into_iter().chain(a.light_map()).collect(),
            Self::Lighting(l) => l.normal_map().into_iter().collect(),
        }
    }

    fn hooks(&self) -> &dyn ShadingHooks {
        match self {
            Self::Ambient(a) => a,
            Self::Lighting(l) => l,
        }
    }
}

impl ShadingHooks for PassKind {
    fn include_dependencies(&self, state: &PassState, shader: &mut ShaderObject) {
        self.hooks().include_dependencies(state, shader);
    }

    fn pre_vertex_code(&self, state: &PassState, cx: &mut CompilationContext) -> Result<String> {
        self.hooks().pre_vertex_code(state, cx)
    }

    fn vertex_code(&self, state: &PassState, cx: &mut CompilationContext) -> Result<String> {
        self.hooks().vertex_code(state, cx)
    }

    fn normal_fragment_code(&self, state: &PassState, cx: &mut CompilationContext) -> Result<String> {
        self.hooks().normal_fragment_code(state, cx)
    }

    fn fragment_code(
        &self,
        state: &PassState,
        cx: &mut CompilationContext,
        target: RegisterHandle,
    ) -> Result<String> {
        self.hooks().fragment_code(state, cx, target)
    }

    fn init_constant_data(&self, state: &PassState, shader: &mut ShaderObject) {
        self.hooks().init_constant_data(state, shader);
    }

    fn activate(&self, state: &PassState, shader: &mut ShaderObject, env: &ActivationEnv<'_>) {
        self.hooks().activate(state, shader, env);
    }
}

// ============================================================================
// Pass State
// ============================================================================

/// State shared by every pass variant.
#[derive(Debug, Clone)]
pub struct PassState {
    tracker: ChangeTracker,
    owners: FxHashMap<MaterialHandle, PassOwnerRecord>,

    blend_mode: BlendMode,
    depth_compare_mode: CompareMode,
    write_depth: bool,
    default_culling: TriangleFace,

    force_separate_mvp: bool,
    include_casters: bool,
    preserve_alpha: bool,
    pass_mode: PassMode,

    light_picker: Option<LightPickerHandle>,
    picker_counts: Option<PickerCounts>,
    light_offsets: LightCounts,
    light_counts: LightCounts,
    max_lights: u32,
    max_light_probes: u32,

    color_transform: Option<ColorTransform>,
    render_target: Option<TextureHandle>,
}

impl Default for PassState {
    fn default() -> Self {
        Self::new()
    }
}

impl PassState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracker: ChangeTracker::new(),
            owners: FxHashMap::default(),
            blend_mode: BlendMode::Normal,
            depth_compare_mode: CompareMode::LessEqual,
            write_depth: true,
            default_culling: TriangleFace::Back,
            force_separate_mvp: false,
            include_casters: true,
            preserve_alpha: true,
            pass_mode: PassMode::default(),
            light_picker: None,
            picker_counts: None,
            light_offsets: LightCounts::default(),
            light_counts: LightCounts::default(),
            max_lights: 3,
            max_light_probes: 4,
            color_transform: None,
            render_target: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    /// Stales the compiled state of every owner.
    pub fn invalidate(&mut self) {
        self.tracker.changed();
    }

    // --- Blend / depth / culling ---

    #[inline]
    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        if self.blend_mode != mode {
            self.blend_mode = mode;
            self.invalidate();
        }
    }

    #[inline]
    #[must_use]
    pub fn depth_compare_mode(&self) -> CompareMode {
        self.depth_compare_mode
    }

    pub fn set_depth_compare_mode(&mut self, mode: CompareMode) {
        self.depth_compare_mode = mode;
    }

    #[inline]
    #[must_use]
    pub fn write_depth(&self) -> bool {
        self.write_depth
    }

    pub fn set_write_depth(&mut self, write: bool) {
        self.write_depth = write;
    }

    #[inline]
    #[must_use]
    pub fn default_culling(&self) -> TriangleFace {
        self.default_culling
    }

    pub fn set_default_culling(&mut self, face: TriangleFace) {
        self.default_culling = face;
    }

    // --- Code-shaping flags ---

    #[inline]
    #[must_use]
    pub fn force_separate_mvp(&self) -> bool {
        self.force_separate_mvp
    }

    /// Keeps the scene and view-projection matrices apart in the vertex
    /// program, trading a second `m44` for precision in multi-pass rendering.
    pub fn set_force_separate_mvp(&mut self, value: bool) {
        if self.force_separate_mvp != value {
            self.force_separate_mvp = value;
            self.invalidate();
        }
    }

    #[inline]
    #[must_use]
    pub fn include_casters(&self) -> bool {
        self.include_casters
    }

    pub fn set_include_casters(&mut self, value: bool) {
        if self.include_casters != value {
            self.include_casters = value;
            self.invalidate();
            self.refresh_light_counts();
        }
    }

    #[inline]
    #[must_use]
    pub fn preserve_alpha(&self) -> bool {
        self.preserve_alpha
    }

    pub fn set_preserve_alpha(&mut self, value: bool) {
        if self.preserve_alpha != value {
            self.preserve_alpha = value;
            self.invalidate();
        }
    }

    #[inline]
    #[must_use]
    pub fn pass_mode(&self) -> PassMode {
        self.pass_mode
    }

    pub fn set_pass_mode(&mut self, mode: PassMode) {
        if self.pass_mode != mode {
            self.pass_mode = mode;
            self.invalidate();
            self.refresh_light_counts();
        }
    }

    #[must_use]
    pub fn color_transform(&self) -> Option<&ColorTransform> {
        self.color_transform.as_ref()
    }

    /// Adding or removing the transform changes code; changing its values
    /// only changes constants.
    pub fn set_color_transform(&mut self, transform: Option<ColorTransform>) {
        if self.color_transform.is_some() != transform.is_some() {
            self.invalidate();
        }
        self.color_transform = transform;
    }

    #[inline]
    #[must_use]
    pub fn render_target(&self) -> Option<TextureHandle> {
        self.render_target
    }

    /// Renders this pass into `target` instead of the current target.
    pub fn set_render_target(&mut self, target: Option<TextureHandle>) {
        self.render_target = target;
    }

    // --- Lights ---

    #[inline]
    #[must_use]
    pub fn light_picker(&self) -> Option<LightPickerHandle> {
        self.light_picker
    }

    #[inline]
    #[must_use]
    pub fn light_counts(&self) -> LightCounts {
        self.light_counts
    }

    #[inline]
    #[must_use]
    pub fn light_offsets(&self) -> LightCounts {
        self.light_offsets
    }

    /// Skips the first lights of each class, for passes that split a picker
    /// across several draws.
    pub fn set_light_offsets(&mut self, offsets: LightCounts) {
        self.light_offsets = offsets;
        self.refresh_light_counts();
    }

    #[inline]
    #[must_use]
    pub fn max_lights(&self) -> u32 {
        self.max_lights
    }

    pub fn set_light_budget(&mut self, max_lights: u32, max_light_probes: u32) {
        self.max_lights = max_lights;
        self.max_light_probes = max_light_probes;
        self.refresh_light_counts();
    }

    pub(crate) fn set_light_picker(&mut self, picker: Option<(LightPickerHandle, PickerCounts)>) {
        self.light_picker = picker.map(|(handle, _)| handle);
        self.picker_counts = picker.map(|(_, counts)| counts);
        self.refresh_light_counts();
    }

    /// Called when the subscribed picker changed.
    pub(crate) fn picker_changed(&mut self, counts: PickerCounts) {
        self.picker_counts = Some(counts);
        self.refresh_light_counts();
    }

    /// Recomputes the light counts; invalidates only if one of them changed.
    fn refresh_light_counts(&mut self) {
        let counts = match self.picker_counts {
            Some(picker) if self.pass_mode.contains(PassMode::LIGHTING) => self.capped_counts(picker),
            _ => LightCounts::default(),
        };
        if counts != self.light_counts {
            self.light_counts = counts;
            self.invalidate();
        }
    }

    fn capped_counts(&self, picker: PickerCounts) -> LightCounts {
        let (mut directional, mut point) = (picker.directional, picker.point);
        if self.include_casters {
            directional += picker.casting_directional;
            point += picker.casting_point;
        }
        let directional = directional.saturating_sub(self.light_offsets.directional);
        let point = point.saturating_sub(self.light_offsets.point);
        let probes = picker.probes.saturating_sub(self.light_offsets.probes);

        let capped = LightCounts {
            directional: directional.min(self.max_lights),
            point: point.min(self.max_lights.saturating_sub(directional.min(self.max_lights))),
            probes: probes.min(self.max_light_probes),
        };
        if capped.directional + capped.point < directional + point || capped.probes < probes {
            log::warn!(
                "Light picker exceeds the pass budget ({} lights, {} probes); extra lights are ignored",
                self.max_lights,
                self.max_light_probes
            );
        }
        capped
    }

    // --- Owners ---

    pub(crate) fn add_owner(&mut self, material: MaterialHandle) {
        self.owners.entry(material).or_default();
    }

    pub(crate) fn remove_owner(&mut self, material: MaterialHandle) {
        self.owners.remove(&material);
    }

    #[must_use]
    pub fn has_owner(&self, material: MaterialHandle) -> bool {
        self.owners.contains_key(&material)
    }

    pub fn owners(&self) -> impl Iterator<Item = MaterialHandle> + '_ {
        self.owners.keys().copied()
    }

    /// Stales the compiled state of a single owner.
    pub fn invalidate_owner(&mut self, material: MaterialHandle) {
        if let Some(record) = self.owners.get_mut(&material) {
            record.tracker.changed();
        }
    }

    /// Version of one owner's record, or `None` if `material` does not own the pass.
    #[must_use]
    pub fn owner_version(&self, material: MaterialHandle) -> Option<u64> {
        self.owners.get(&material).map(|record| record.tracker.version())
    }
}

// ============================================================================
// Material Pass
// ============================================================================

/// Versions of everything that shapes a pass's code: the shared state and
/// the active variant. Compared as a pair, never summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PassVersion {
    pub state: u64,
    pub code: u64,
}

#[derive(Debug, Clone)]
pub struct MaterialPass {
    pub name: String,
    state: PassState,
    kind: PassKind,
}

impl MaterialPass {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PassKind) -> Self {
        Self {
            name: name.into(),
            state: PassState::new(),
            kind,
        }
    }

    #[must_use]
    pub fn ambient(name: impl Into<String>) -> Self {
        Self::new(name, PassKind::Ambient(AmbientShading::new()))
    }

    #[must_use]
    pub fn lighting(name: impl Into<String>) -> Self {
        Self::new(name, PassKind::Lighting(LightingShading::new()))
    }

    /// Applies the light budgets configured in `settings`.
    #[must_use]
    pub fn with_settings(mut self, settings: &StageSettings) -> Self {
        let (max_lights, max_light_probes) = settings.pass_defaults();
        self.state.set_light_budget(max_lights, max_light_probes);
        self
    }

    /// Version covering every code-shaping property of the pass.
    #[inline]
    #[must_use]
    pub fn version(&self) -> PassVersion {
        PassVersion {
            state: self.state.version(),
            code: self.kind.code_version(),
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> &PassState {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &PassKind {
        &self.kind
    }

    /// Mutable variant access. Stales every owner up front, since the
    /// variant may be replaced wholesale.
    pub fn kind_mut(&mut self) -> &mut PassKind {
        self.state.invalidate();
        &mut self.kind
    }

    /// Switches the pass to another variant.
    pub fn set_kind(&mut self, kind: PassKind) {
        self.kind = kind;
        self.state.invalidate();
    }

    #[must_use]
    pub fn as_ambient(&self) -> Option<&AmbientShading> {
        match &self.kind {
            PassKind::Ambient(a) => Some(a),
            PassKind::Lighting(_) => None,
        }
    }

    pub fn as_ambient_mut(&mut self) -> Option<&mut AmbientShading> {
        match &mut self.kind {
            PassKind::Ambient(a) => Some(a),
            PassKind::Lighting(_) => None,
        }
    }

    #[must_use]
    pub fn as_lighting(&self) -> Option<&LightingShading> {
        match &self.kind {
            PassKind::Lighting(l) => Some(l),
            PassKind::Ambient(_) => None,
        }
    }

    pub fn as_lighting_mut(&mut self) -> Option<&mut LightingShading> {
        match &mut self.kind {
            PassKind::Lighting(l) => Some(l),
            PassKind::Ambient(_) => None,
        }
    }

    // --- Compiler entry points ---

    pub(crate) fn include_dependencies(&self, shader: &mut ShaderObject) {
        self.kind.include_dependencies(&self.state, shader);
    }

    pub(crate) fn pre_vertex_code(&self, cx: &mut CompilationContext) -> Result<String> {
        self.kind.pre_vertex_code(&self.state, cx)
    }

    pub(crate) fn vertex_code(&self, cx: &mut CompilationContext) -> Result<String> {
        self.kind.vertex_code(&self.state, cx)
    }

    pub(crate) fn normal_fragment_code(&self, cx: &mut CompilationContext) -> Result<String> {
        self.kind.normal_fragment_code(&self.state, cx)
    }

    /// Variant colour code, followed by the colour transform when effects run.
    pub(crate) fn fragment_code(&self, cx: &mut CompilationContext, target: RegisterHandle) -> Result<String> {
        let mut code = self.kind.fragment_code(&self.state, cx, target)?;
        if self.state.pass_mode.contains(PassMode::EFFECTS)
            && let Some(transform) = &self.state.color_transform
        {
            code.push_str(&transform.fragment_code(cx, target)?);
        }
        Ok(code)
    }

    pub(crate) fn init_constant_data(&self, shader: &mut ShaderObject) {
        self.kind.init_constant_data(&self.state, shader);
    }

    // --- Render state ---

    /// Sets pass-wide GPU state and binds the owner's program.
    ///
    /// Must be followed by [`deactivate`](Self::deactivate) before another
    /// pass activates.
    pub fn activate<B: Backend>(
        &self,
        owner: PassOwner,
        assets: &AssetServer,
        ctx: &mut RenderContext<B>,
        camera: &Camera,
    ) -> Result<()> {
        let material = assets.material(owner.material)?;
        let blending = self.state.blend_mode.enables_blending();

        ctx.set_depth_test(self.state.write_depth && !blending, self.state.depth_compare_mode)?;
        if blending {
            let (source, destination) = self.state.blend_mode.factors();
            ctx.set_blend_factors(source, destination)?;
        }

        let light_picker = self
            .state
            .light_picker
            .map(|handle| assets.light_picker(handle))
            .transpose()?;
        let env = ActivationEnv { camera, light_picker };

        let bindings = {
            let shader = ctx.get_shader_object(owner, assets)?;
            self.kind.activate(&self.state, shader, &env);
            if self.state.pass_mode.contains(PassMode::EFFECTS)
                && let Some(transform) = &self.state.color_transform
            {
                transform.write_constants(shader);
            }
            texture_bindings(shader)
        };

        for binding in bindings {
            ctx.activate_texture(binding.slot, binding.texture, assets)?;
            ctx.set_sampler_state_at(binding.slot, binding.sampler)?;
        }

        ctx.activate_shader_object(owner, assets)?;

        let culling = if material.both_sides() {
            TriangleFace::None
        } else {
            self.state.default_culling
        };
        ctx.set_culling(culling, camera.coordinate_system)?;

        if let Some(target) = self.state.render_target {
            ctx.push_render_target(target, assets)?;
        }
        Ok(())
    }

    /// Uploads per-draw constants and streams, then draws `renderable`.
    pub fn set_render_state<B: Backend>(
        &self,
        owner: PassOwner,
        renderable: &Renderable,
        assets: &AssetServer,
        ctx: &mut RenderContext<B>,
        camera: &Camera,
    ) -> Result<()> {
        let streams = {
            let shader = ctx.shader_object_mut(owner)?;
            write_draw_constants(shader, renderable, camera);
            [
                (shader.uv_buffer_index, renderable.uvs, VertexBufferFormat::Float2),
                (
                    shader.secondary_uv_buffer_index,
                    renderable.secondary_uvs,
                    VertexBufferFormat::Float2,
                ),
                (shader.normal_buffer_index, renderable.normals, VertexBufferFormat::Float3),
                (shader.tangent_buffer_index, renderable.tangents, VertexBufferFormat::Float3),
            ]
        };

        ctx.upload_shader_constants(owner)?;
        ctx.activate_buffer(0, renderable.positions, VertexBufferFormat::Float3, assets)?;
        for (slot, stream, format) in streams {
            let Some(slot) = slot else { continue };
            let stream = stream.ok_or_else(|| {
                StageError::InvalidArgument(format!(
                    "pass '{}' reads vertex stream {slot} but the renderable has none",
                    self.name
                ))
            })?;
            ctx.activate_buffer(slot, stream, format, assets)?;
        }

        ctx.draw_triangles(renderable.indices, 0, renderable.num_triangles, assets)
    }

    /// Restores the state changed by [`activate`](Self::activate).
    pub fn deactivate<B: Backend>(&self, owner: PassOwner, ctx: &mut RenderContext<B>) -> Result<()> {
        ctx.deactivate_shader_object(owner)?;
        if self.state.render_target.is_some() {
            ctx.pop_render_target()?;
        }
        if self.state.blend_mode.enables_blending() {
            ctx.set_blend_factors(BlendFactor::One, BlendFactor::Zero)?;
        }
        ctx.set_depth_test(true, CompareMode::LessEqual)
    }
}

/// Bindings of the textures the compiled program samples, with sampler
/// state matching the code it was compiled to.
fn texture_bindings(shader: &ShaderObject) -> SmallVec<[TextureBinding; 2]> {
    shader
        .sampled_textures
        .iter()
        .map(|sampled| TextureBinding {
            slot: sampled.slot,
            texture: sampled.texture,
            sampler: SamplerSettings::for_shader(shader, &sampled.signature),
        })
        .collect()
}

fn write_draw_constants(shader: &mut ShaderObject, renderable: &Renderable, camera: &Camera) {
    let scene = renderable.scene_transform;
    match shader.scene_matrix_index {
        Some(index) => {
            shader.write_vertex_matrix(index, &scene);
            shader.write_vertex_matrix(shader.view_matrix_index, &camera.view_projection);
        }
        None => {
            let combined = camera.view_projection * scene;
            shader.write_vertex_matrix(shader.view_matrix_index, &combined);
        }
    }

    if let Some(index) = shader.scene_normal_matrix_index {
        let normal = Mat3::from_mat4(scene).inverse().transpose();
        for row in 0..3 {
            shader.write_vertex_constants(index + row * 4, &normal.row(row).extend(0.0).to_array());
        }
    }

    if let Some(index) = shader.camera_position_index {
        let position = camera.scene_position;
        shader.write_vertex_constants(index, &position.extend(1.0).to_array());
    }

    if let Some(index) = shader.uv_transform_index {
        let uv = renderable.uv_transform;
        let (x_axis, y_axis, t) = (uv.matrix2.x_axis, uv.matrix2.y_axis, uv.translation);
        shader.write_vertex_constants(
            index,
            &[x_axis.x, y_axis.x, 0.0, t.x, x_axis.y, y_axis.y, 0.0, t.y],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picker_counts(directional: u32, point: u32, probes: u32) -> PickerCounts {
        PickerCounts {
            directional,
            point,
            casting_directional: 0,
            casting_point: 0,
            probes,
        }
    }

    #[test]
    fn blend_modes_map_to_factors() {
        assert_eq!(BlendMode::Normal.factors(), (BlendFactor::One, BlendFactor::Zero));
        assert_eq!(BlendMode::Multiply.factors(), (BlendFactor::Zero, BlendFactor::SourceColor));
        assert!(!BlendMode::Normal.enables_blending());
        assert!(BlendMode::Add.enables_blending());
        assert_eq!("LAYER".parse::<BlendMode>().unwrap(), BlendMode::Layer);
        assert!(matches!(
            "screen".parse::<BlendMode>(),
            Err(StageError::UnknownBlendMode(name)) if name == "screen"
        ));
    }

    #[test]
    fn light_counts_are_capped_not_rejected() {
        let mut state = PassState::new();
        state.set_light_picker(None);
        let base = state.version();

        state.picker_changed(picker_counts(2, 5, 6));
        assert_eq!(
            state.light_counts(),
            LightCounts {
                directional: 2,
                point: 1,
                probes: 4
            }
        );
        assert!(state.version() > base);
    }

    #[test]
    fn casters_count_before_the_cap() {
        let mut state = PassState::new();
        state.picker_changed(PickerCounts {
            directional: 1,
            point: 0,
            casting_directional: 4,
            casting_point: 0,
            probes: 0,
        });
        assert_eq!(state.light_counts().directional, 3);

        state.set_include_casters(false);
        assert_eq!(state.light_counts().directional, 1);
    }

    #[test]
    fn offsets_saturate_at_zero() {
        let mut state = PassState::new();
        state.picker_changed(picker_counts(1, 1, 0));
        state.set_light_offsets(LightCounts {
            directional: 3,
            point: 0,
            probes: 2,
        });
        assert_eq!(
            state.light_counts(),
            LightCounts {
                directional: 0,
                point: 1,
                probes: 0
            }
        );
    }

    #[test]
    fn unchanged_counts_do_not_invalidate() {
        let mut state = PassState::new();
        state.picker_changed(picker_counts(1, 0, 0));
        let version = state.version();
        state.picker_changed(picker_counts(1, 0, 0));
        assert_eq!(state.version(), version);
    }

    #[test]
    fn lighting_mode_gates_counts() {
        let mut state = PassState::new();
        state.picker_changed(picker_counts(2, 0, 1));
        state.set_pass_mode(PassMode::EFFECTS);
        assert_eq!(state.light_counts(), LightCounts::default());
    }

    #[test]
    fn pass_version_tracks_variant_changes() {
        let mut pass = MaterialPass::lighting("lit");
        let before = pass.version();
        pass.as_lighting_mut().unwrap().set_gloss(Some(20.0));
        assert_ne!(pass.version(), before);
        assert_eq!(pass.version().state, before.state);

        let before = pass.version();
        pass.as_lighting_mut().unwrap().set_gloss(Some(40.0));
        assert_eq!(pass.version(), before);
    }

    #[test]
    fn swapping_the_variant_changes_the_version() {
        let mut pass = MaterialPass::ambient("swap");
        let before = pass.version();

        // Both fresh variants start at code version zero; the state must move.
        pass.set_kind(PassKind::Lighting(LightingShading::new()));
        let after_set = pass.version();
        assert_ne!(after_set, before);

        *pass.kind_mut() = PassKind::Ambient(AmbientShading::new());
        assert_ne!(pass.version(), after_set);
        assert!(pass.as_ambient().is_some());
    }
}
