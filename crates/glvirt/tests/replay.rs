mod common;

use common::{Rig, FRAGMENT_SHADER, VERTEX_SHADER};
use gl::types::GLenum;
use std::sync::Arc;

use glvirt::{bytes, Pumped};
use glvirt_core::{Arg, CommandBuffer, Envelope, Handle, Op, ResponseSlot};
use glvirt_state::{GlContext, GlState, ParamValue};
use proptest::prelude::*;

#[test]
fn render_path_uses_the_latest_frame() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    let mut textures = Vec::new();

    // R1, Res1, R2, Res2, R3
    for (i, red) in [64u8, 128, 255].into_iter().enumerate() {
        p.create_and_activate(true).unwrap();
        p.clear_color(red as f32 / 255.0, 0.0, 0.0, 1.0).unwrap();
        p.clear(gl::COLOR_BUFFER_BIT).unwrap();
        if i < 2 {
            p.create_and_activate(false).unwrap();
            textures.push(p.create_texture().unwrap());
        }
    }
    p.execute().unwrap();
    assert_eq!(rig.deliver(), 5);

    let pumped = rig.replayer.pump(&mut rig.ctx);
    assert_eq!(
        pumped,
        Pumped {
            resources: 2,
            frame: Some(4)
        }
    );
    for texture in textures {
        let name = rig.replayer.registry().resolve(texture).unwrap();
        assert!(rig.ctx.is_texture(name));
    }
    assert_eq!(rig.pixel(), [255, 0, 0, 255]);
    assert_eq!(rig.replayer.pump(&mut rig.ctx), Pumped::default());
}

#[test]
fn frames_diff_from_the_real_context() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    p.create_and_activate(true).unwrap();
    p.enable(gl::SCISSOR_TEST).unwrap();
    p.scissor(0, 0, 1, 1).unwrap();
    p.clear_color(0.0, 1.0, 0.0, 1.0).unwrap();
    p.clear(gl::COLOR_BUFFER_BIT).unwrap();
    p.create_and_activate(true).unwrap();
    p.clear(gl::COLOR_BUFFER_BIT).unwrap();
    p.execute().unwrap();
    rig.deliver();

    // The second frame starts with scissoring and the clear color of the
    // first, which never ran.
    assert_eq!(rig.replayer.pump(&mut rig.ctx).frame, Some(1));
    assert!(rig.ctx.is_enabled(gl::SCISSOR_TEST));
    assert_eq!(rig.pixel(), [0, 255, 0, 255]);
    assert_eq!(rig.replayer.current(), rig.replayer.logical());
    assert_eq!(rig.replayer.logical(), rig.proxy.mirror());
}

#[test]
fn rerendering_skips_lifecycle_commands() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    p.create_and_activate(true).unwrap();
    let texture = p.create_texture().unwrap();
    p.bind_texture(gl::TEXTURE_2D, texture).unwrap();
    p.clear(gl::COLOR_BUFFER_BIT).unwrap();
    p.execute().unwrap();
    rig.deliver();

    rig.replayer.pump(&mut rig.ctx);
    let name = rig.replayer.registry().resolve(texture).unwrap();
    assert_eq!(rig.ctx.get_integer(gl::TEXTURE_BINDING_2D) as u32, name);

    rig.ctx.bind_texture(gl::TEXTURE_2D, 0);
    rig.replayer.resynchronize(&mut rig.ctx).unwrap();
    assert_eq!(rig.replayer.render_latest(&mut rig.ctx), Some(0));
    assert_eq!(rig.replayer.registry().resolve(texture), Some(name));
    assert_eq!(rig.ctx.get_integer(gl::TEXTURE_BINDING_2D) as u32, name);
}

#[test]
fn deletes_wait_for_the_next_frame() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    p.create_and_activate(false).unwrap();
    let texture = p.create_texture().unwrap();
    p.create_and_activate(true).unwrap();
    p.bind_texture(gl::TEXTURE_2D, texture).unwrap();
    p.clear(gl::COLOR_BUFFER_BIT).unwrap();
    p.create_and_activate(false).unwrap();
    p.delete_texture(texture).unwrap();
    p.execute().unwrap();
    rig.deliver();

    rig.replayer.pump(&mut rig.ctx);
    let name = rig.replayer.registry().resolve(texture).unwrap();
    assert!(rig.ctx.is_texture(name), "the frame on screen still uses it");
    assert_eq!(rig.replayer.render_latest(&mut rig.ctx), Some(1));

    next_frame(&mut rig);
    rig.replayer.pump(&mut rig.ctx);
    assert!(!rig.ctx.is_texture(name));
    assert_eq!(rig.replayer.registry().resolve(texture), None);
    assert_eq!(rig.ctx.get_integer(gl::TEXTURE_BINDING_2D), 0);
}

fn next_frame(rig: &mut Rig) {
    rig.proxy.create_and_activate(true).unwrap();
    rig.proxy.clear(gl::COLOR_BUFFER_BIT).unwrap();
    rig.proxy.execute().unwrap();
    rig.deliver();
}

#[test]
fn unused_objects_are_deleted_right_away() {
    let mut rig = Rig::new();
    rig.proxy.create_and_activate(false).unwrap();
    let shown = rig.proxy.create_texture().unwrap();
    let spare = rig.proxy.create_texture().unwrap();
    rig.proxy.execute().unwrap();
    rig.deliver();
    rig.replayer.pump(&mut rig.ctx);
    let spare_name = rig.replayer.registry().resolve(spare).unwrap();

    let p = &mut rig.proxy;
    p.create_and_activate(true).unwrap();
    p.bind_texture(gl::TEXTURE_2D, shown).unwrap();
    p.clear(gl::COLOR_BUFFER_BIT).unwrap();
    p.create_and_activate(false).unwrap();
    p.delete_texture(spare).unwrap();
    p.execute().unwrap();
    rig.deliver();

    rig.replayer.pump(&mut rig.ctx);
    assert!(!rig.ctx.is_texture(spare_name));
    assert_eq!(rig.replayer.registry().resolve(spare), None);
    assert_eq!(rig.replayer.retire_deferred(&mut rig.ctx), 0);
}

#[test]
fn held_deletes_retire_without_another_frame() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    p.create_and_activate(false).unwrap();
    let texture = p.create_texture().unwrap();
    p.create_and_activate(true).unwrap();
    p.bind_texture(gl::TEXTURE_2D, texture).unwrap();
    p.clear(gl::COLOR_BUFFER_BIT).unwrap();
    p.create_and_activate(false).unwrap();
    p.delete_texture(texture).unwrap();
    p.execute().unwrap();
    rig.deliver();

    rig.replayer.pump(&mut rig.ctx);
    let name = rig.replayer.registry().resolve(texture).unwrap();
    assert!(rig.ctx.is_texture(name));

    assert_eq!(rig.replayer.retire_deferred(&mut rig.ctx), 1);
    assert!(!rig.ctx.is_texture(name));
    assert_eq!(rig.replayer.registry().resolve(texture), None);
}

#[test]
fn programs_built_inside_frames_are_usable() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;

    // Built in a frame that is superseded before it is ever drawn.
    p.create_and_activate(true).unwrap();
    let vs = p.create_shader(gl::VERTEX_SHADER).unwrap();
    p.shader_source(vs, VERTEX_SHADER).unwrap();
    p.compile_shader(vs).unwrap();
    let fs = p.create_shader(gl::FRAGMENT_SHADER).unwrap();
    p.shader_source(fs, FRAGMENT_SHADER).unwrap();
    p.compile_shader(fs).unwrap();
    let program = p.create_program().unwrap();
    p.attach_shader(program, vs).unwrap();
    p.attach_shader(program, fs).unwrap();
    p.link_program(program).unwrap();
    let tint = p.get_uniform_location(program, "tint").unwrap();
    p.use_program(program).unwrap();
    p.uniform4f(tint, 1.0, 0.0, 0.0, 1.0).unwrap();
    p.draw_arrays(gl::TRIANGLES, 0, 3).unwrap();

    p.create_and_activate(true).unwrap();
    p.uniform4f(tint, 0.0, 1.0, 0.0, 1.0).unwrap();
    p.draw_arrays(gl::TRIANGLES, 0, 3).unwrap();
    p.execute().unwrap();
    rig.deliver();

    assert_eq!(rig.replayer.pump(&mut rig.ctx).frame, Some(1));
    let native = rig.replayer.registry().resolve(program).unwrap();
    let location = rig.ctx.get_uniform_location(native, "tint");
    assert!(location >= 0);
    assert_eq!(rig.ctx.draw_calls(), 1);
    assert_eq!(
        rig.ctx.uniform_value(native, location),
        Some(&[0.0, 1.0, 0.0, 1.0][..])
    );
}

#[test]
fn a_frame_can_set_up_and_draw_in_one_pass() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    p.create_and_activate(true).unwrap();
    let vs = p.create_shader(gl::VERTEX_SHADER).unwrap();
    p.shader_source(vs, VERTEX_SHADER).unwrap();
    p.compile_shader(vs).unwrap();
    let fs = p.create_shader(gl::FRAGMENT_SHADER).unwrap();
    p.shader_source(fs, FRAGMENT_SHADER).unwrap();
    p.compile_shader(fs).unwrap();
    let program = p.create_program().unwrap();
    p.attach_shader(program, vs).unwrap();
    p.attach_shader(program, fs).unwrap();
    p.link_program(program).unwrap();
    let tint = p.get_uniform_location(program, "tint").unwrap();
    p.use_program(program).unwrap();
    p.uniform4f(tint, 0.25, 0.5, 0.75, 1.0).unwrap();
    p.draw_arrays(gl::TRIANGLES, 0, 3).unwrap();
    p.execute().unwrap();
    rig.deliver();

    rig.replayer.pump(&mut rig.ctx);
    let native = rig.replayer.registry().resolve(program).unwrap();
    let location = rig.ctx.get_uniform_location(native, "tint");
    assert_eq!(
        rig.ctx.uniform_value(native, location),
        Some(&[0.25, 0.5, 0.75, 1.0][..])
    );

    // Drawing again does not relink, so the location stays valid.
    assert_eq!(rig.replayer.render_latest(&mut rig.ctx), Some(0));
    assert_eq!(rig.ctx.draw_calls(), 2);
    assert_eq!(rig.replayer.registry().resolve(program), Some(native));
}

#[test]
fn deleting_the_current_program_unbinds_it_everywhere() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    p.create_and_activate(false).unwrap();
    let program = p.create_program().unwrap();
    p.use_program(program).unwrap();
    p.delete_program(program).unwrap();
    p.execute().unwrap();
    rig.deliver();

    rig.replayer.pump(&mut rig.ctx);
    assert_eq!(rig.proxy.mirror().program(), Handle::NULL);
    assert_eq!(rig.replayer.logical(), rig.proxy.mirror());
    assert_eq!(rig.replayer.current(), rig.replayer.logical());
    assert_eq!(rig.ctx.get_integer(gl::CURRENT_PROGRAM), 0);
    assert_eq!(rig.replayer.registry().resolve(program), None);
}

#[test]
fn bound_texture_and_parameter_fold_together() {
    let mut rig = Rig::new();
    let p = &mut rig.proxy;
    p.create_and_activate(true).unwrap();
    let textures: Vec<Handle> = (0..5).map(|_| p.create_texture().unwrap()).collect();
    assert_eq!(textures[4], Handle::from_raw(5));
    p.bind_texture(gl::TEXTURE_2D, Handle::from_raw(5)).unwrap();
    p.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32)
        .unwrap();
    p.execute().unwrap();

    let envelope = rig.consumer.drain().next().unwrap();
    let buffer = envelope.into_command_buffer().unwrap();
    let initial = GlState::new(rig.proxy.mirror().layout().clone());
    let end = GlState::create_end_state_from_command_buffer(&initial, &buffer);

    let unit = end.texture_unit(end.active_unit()).unwrap();
    let bound = &unit.targets[&gl::TEXTURE_2D];
    assert_eq!(bound.texture, Handle::from_raw(5));
    assert_eq!(
        bound.parameters[&gl::TEXTURE_MIN_FILTER],
        ParamValue::Int(gl::LINEAR as i32)
    );
    assert_eq!(&end, rig.proxy.mirror());
}

#[test]
fn buffers_after_a_lost_creation_are_skipped() {
    let mut rig = Rig::new();
    let orphan = Handle::from_raw(9);

    let mut first = CommandBuffer::new(0, false);
    first.add_message(Op::BindTexture, vec![Arg::Enum(gl::TEXTURE_2D), orphan.into()]);
    let first_error = Arc::new(ResponseSlot::new());
    first.add_message_and_wait(Op::GetError, vec![], Arc::clone(&first_error));
    let mut second = CommandBuffer::new(1, false);
    let second_error = Arc::new(ResponseSlot::new());
    second.add_message_and_wait(Op::GetError, vec![], Arc::clone(&second_error));

    rig.replayer.accept(Envelope::from_buffer(0, &mut first));
    rig.replayer.accept(Envelope::from_buffer(0, &mut second));
    assert_eq!(rig.replayer.pump(&mut rig.ctx).resources, 2);

    assert_eq!(first_error.take_payload().unwrap(), bytes::encode_enum(gl::NO_ERROR));
    // The second buffer starts from a binding that never existed.
    assert!(second_error.take_payload().unwrap().is_empty());
    assert_eq!(rig.ctx.get_integer(gl::TEXTURE_BINDING_2D), 0);
}

// ---------------------------------------------------------------------------
// Folding versus live replay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Call {
    ActiveTexture(u32),
    BindTexture(Option<usize>),
    TexParameter(GLenum, i32),
    BindBuffer(Option<usize>),
    UseProgram(bool),
    Toggle(GLenum, bool),
    Viewport([i32; 4]),
    ClearColor(u8),
    BlendFunc(GLenum, GLenum),
    DepthFunc(GLenum),
    ColorMask([bool; 4]),
    UnpackAlignment(i32),
}

fn call() -> impl Strategy<Value = Call> {
    let texture = prop::option::of(0usize..3);
    prop_oneof![
        (0u32..4).prop_map(Call::ActiveTexture),
        texture.prop_map(Call::BindTexture),
        (
            prop::sample::select(vec![gl::TEXTURE_MIN_FILTER, gl::TEXTURE_MAG_FILTER]),
            prop::sample::select(vec![gl::NEAREST as i32, gl::LINEAR as i32]),
        )
            .prop_map(|(p, v)| Call::TexParameter(p, v)),
        prop::option::of(0usize..2).prop_map(Call::BindBuffer),
        any::<bool>().prop_map(Call::UseProgram),
        (
            prop::sample::select(vec![gl::BLEND, gl::DEPTH_TEST, gl::CULL_FACE, gl::SCISSOR_TEST]),
            any::<bool>(),
        )
            .prop_map(|(c, on)| Call::Toggle(c, on)),
        prop::array::uniform4(0i32..64).prop_map(Call::Viewport),
        (0u8..=4).prop_map(Call::ClearColor),
        (
            prop::sample::select(vec![gl::ONE, gl::SRC_ALPHA]),
            prop::sample::select(vec![gl::ZERO, gl::ONE_MINUS_SRC_ALPHA]),
        )
            .prop_map(|(s, d)| Call::BlendFunc(s, d)),
        prop::sample::select(vec![gl::LESS, gl::LEQUAL, gl::ALWAYS]).prop_map(Call::DepthFunc),
        prop::array::uniform4(any::<bool>()).prop_map(Call::ColorMask),
        prop::sample::select(vec![1, 2, 4, 8]).prop_map(Call::UnpackAlignment),
    ]
}

struct Objects {
    textures: Vec<Handle>,
    buffers: Vec<Handle>,
    program: Handle,
}

fn record(rig: &mut Rig, objects: &Objects, call: &Call) {
    let p = &mut rig.proxy;
    let pick = |list: &[Handle], i: Option<usize>| i.map_or(Handle::NULL, |i| list[i]);
    let result = match *call {
        Call::ActiveTexture(unit) => p.active_texture(gl::TEXTURE0 + unit),
        Call::BindTexture(i) => p.bind_texture(gl::TEXTURE_2D, pick(&objects.textures, i)),
        Call::TexParameter(pname, value) => {
            // Parameters of the default texture are not worth tracking here.
            let bound = p.mirror().bound_texture(gl::TEXTURE_2D).map(|t| t.texture);
            if bound.map_or(true, Handle::is_null) {
                return;
            }
            p.tex_parameter_i(gl::TEXTURE_2D, pname, value)
        }
        Call::BindBuffer(i) => p.bind_buffer(gl::ARRAY_BUFFER, pick(&objects.buffers, i)),
        Call::UseProgram(on) => p.use_program(if on { objects.program } else { Handle::NULL }),
        Call::Toggle(cap, true) => p.enable(cap),
        Call::Toggle(cap, false) => p.disable(cap),
        Call::Viewport([x, y, w, h]) => p.viewport(x, y, w, h),
        Call::ClearColor(level) => {
            let v = level as f32 / 4.0;
            p.clear_color(v, v, v, 1.0)
        }
        Call::BlendFunc(src, dst) => p.blend_func(src, dst),
        Call::DepthFunc(func) => p.depth_func(func),
        Call::ColorMask([r, g, b, a]) => p.color_mask(r, g, b, a),
        Call::UnpackAlignment(alignment) => p.pixel_store_i(gl::UNPACK_ALIGNMENT, alignment),
    };
    result.unwrap();
}

fn setup(rig: &mut Rig) -> Objects {
    let p = &mut rig.proxy;
    p.create_and_activate(false).unwrap();
    let objects = Objects {
        textures: (0..3).map(|_| p.create_texture().unwrap()).collect(),
        buffers: (0..2).map(|_| p.create_buffer().unwrap()).collect(),
        program: p.create_program().unwrap(),
    };
    p.execute().unwrap();
    objects
}

proptest! {
    #[test]
    fn replayed_state_matches_the_folded_state(
        frames in prop::collection::vec(prop::collection::vec(call(), 0..25), 1..4),
    ) {
        let mut rig = Rig::new();
        let objects = setup(&mut rig);
        for frame in &frames {
            rig.proxy.create_and_activate(true).unwrap();
            for c in frame {
                record(&mut rig, &objects, c);
            }
        }
        rig.proxy.execute().unwrap();
        rig.deliver();
        rig.replayer.pump(&mut rig.ctx);
        prop_assert_eq!(rig.ctx.get_error(), gl::NO_ERROR);

        let logical = rig.replayer.logical().clone();
        prop_assert!(&logical == rig.proxy.mirror(), "{:?}", logical.differences(rig.proxy.mirror()));

        let mut registry = rig.replayer.registry().clone();
        let live = GlState::create_from_live_context(&mut rig.ctx, logical.layout(), &mut registry);
        prop_assert!(live == logical, "{:?}", logical.differences(&live));
    }
}
