use glvirt_core::{Arg, Command, CommandBuffer, Handle, HandleRegistry, Op, ResourceKind, StateError};
use glvirt_state::{
    describe, diverged_parameters, GlContext, GlState, LayoutCaps, SoftContext, StateLayout,
};
use proptest::prelude::*;

// Handles of the objects every fixture creates, in allocation order.
const TEX_A: i32 = 1; // TEXTURE_2D
const TEX_CUBE: i32 = 2; // TEXTURE_CUBE_MAP
const TEX_B: i32 = 3; // TEXTURE_2D
const BUF_A: i32 = 4;
const BUF_B: i32 = 5;
const PROGRAM: i32 = 6;
const FRAMEBUFFER: i32 = 7;
const RENDERBUFFER: i32 = 8;
const VERTEX_ARRAY: i32 = 9;

fn fixture() -> (SoftContext, HandleRegistry) {
    let mut ctx = SoftContext::default();
    let mut registry = HandleRegistry::new();
    for kind in [
        ResourceKind::Texture,
        ResourceKind::Texture,
        ResourceKind::Texture,
        ResourceKind::Buffer,
        ResourceKind::Buffer,
        ResourceKind::Program,
        ResourceKind::Framebuffer,
        ResourceKind::Renderbuffer,
        ResourceKind::VertexArray,
    ] {
        let handle = registry.allocate(kind);
        let native = match kind {
            ResourceKind::Texture => ctx.gen_texture(),
            ResourceKind::Buffer => ctx.gen_buffer(),
            ResourceKind::Program => ctx.create_program(),
            ResourceKind::Framebuffer => ctx.gen_framebuffer(),
            ResourceKind::Renderbuffer => ctx.gen_renderbuffer(),
            _ => ctx.gen_vertex_array(),
        };
        registry.bind(handle, kind, native);
    }
    ctx.reset_calls();
    (ctx, registry)
}

fn layout() -> StateLayout {
    let desc = describe(&mut SoftContext::default());
    StateLayout::from_device(&desc, &LayoutCaps::default())
}

fn capture(ctx: &mut SoftContext, registry: &HandleRegistry) -> GlState {
    GlState::create_from_live_context(ctx, &layout(), &mut registry.clone())
}

fn h(raw: i32) -> Arg {
    Arg::Handle(Handle::from_raw(raw))
}

fn handle_of(choices: &'static [i32]) -> impl Strategy<Value = Arg> {
    prop::sample::select(choices).prop_map(h)
}

fn unit_float() -> impl Strategy<Value = Arg> {
    (0u8..=8).prop_map(|v| Arg::Float(v as f32 / 8.0))
}

fn binding_command() -> BoxedStrategy<Command> {
    let c = |op: Op, args: Vec<Arg>| Command::new(op, args);
    prop_oneof![
        handle_of(&[0, PROGRAM]).prop_map(move |p| c(Op::UseProgram, vec![p])),
        (
            prop::sample::select(vec![gl::ARRAY_BUFFER, gl::UNIFORM_BUFFER, gl::COPY_READ_BUFFER]),
            handle_of(&[0, BUF_A, BUF_B]),
        )
            .prop_map(move |(t, b)| c(Op::BindBuffer, vec![Arg::Enum(t), b])),
        (0i32..8, handle_of(&[0, BUF_A, BUF_B])).prop_map(move |(i, b)| c(
            Op::BindBufferBase,
            vec![Arg::Enum(gl::UNIFORM_BUFFER), Arg::Int(i), b]
        )),
        (
            prop::sample::select(vec![gl::FRAMEBUFFER, gl::DRAW_FRAMEBUFFER, gl::READ_FRAMEBUFFER]),
            handle_of(&[0, FRAMEBUFFER]),
        )
            .prop_map(move |(t, f)| c(Op::BindFramebuffer, vec![Arg::Enum(t), f])),
        handle_of(&[0, RENDERBUFFER])
            .prop_map(move |r| c(Op::BindRenderbuffer, vec![Arg::Enum(gl::RENDERBUFFER), r])),
        handle_of(&[0, VERTEX_ARRAY]).prop_map(move |v| c(Op::BindVertexArray, vec![v])),
        (0u32..16).prop_map(move |u| c(Op::ActiveTexture, vec![Arg::Enum(gl::TEXTURE0 + u)])),
        prop::sample::select(vec![
            (gl::TEXTURE_2D, TEX_A),
            (gl::TEXTURE_2D, TEX_B),
            (gl::TEXTURE_2D, 0),
            (gl::TEXTURE_CUBE_MAP, TEX_CUBE),
            (gl::TEXTURE_CUBE_MAP, 0),
        ])
        .prop_map(move |(t, tex)| c(Op::BindTexture, vec![Arg::Enum(t), h(tex)])),
        (
            prop::sample::select(vec![gl::TEXTURE_2D, gl::TEXTURE_CUBE_MAP]),
            prop::sample::select(vec![
                (gl::TEXTURE_MIN_FILTER, gl::LINEAR),
                (gl::TEXTURE_MIN_FILTER, gl::NEAREST),
                (gl::TEXTURE_MAG_FILTER, gl::NEAREST),
                (gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE),
                (gl::TEXTURE_WRAP_T, gl::MIRRORED_REPEAT),
            ]),
        )
            .prop_map(move |(t, (pname, v))| c(
                Op::TexParameteri,
                vec![Arg::Enum(t), Arg::Enum(pname), Arg::Int(v as i32)]
            )),
        (prop::sample::select(vec![gl::TEXTURE_2D, gl::TEXTURE_CUBE_MAP]), -8i32..8).prop_map(
            move |(t, lod)| c(
                Op::TexParameterf,
                vec![Arg::Enum(t), Arg::Enum(gl::TEXTURE_MIN_LOD), Arg::Float(lod as f32)]
            )
        ),
    ]
    .boxed()
}

fn value_command() -> BoxedStrategy<Command> {
    let c = |op: Op, args: Vec<Arg>| Command::new(op, args);
    prop_oneof![
        (
            any::<bool>(),
            prop::sample::select(vec![gl::BLEND, gl::CULL_FACE, gl::DEPTH_TEST, gl::SCISSOR_TEST, gl::DITHER]),
        )
            .prop_map(move |(on, cap)| c(
                if on { Op::Enable } else { Op::Disable },
                vec![Arg::Enum(cap)]
            )),
        (unit_float(), unit_float(), unit_float(), unit_float())
            .prop_map(move |(r, g, b, a)| c(Op::ClearColor, vec![r, g, b, a])),
        (0i32..64, 0i32..64, 0i32..512, 0i32..512).prop_map(move |(x, y, w, hh)| c(
            Op::Viewport,
            vec![Arg::Int(x), Arg::Int(y), Arg::Int(w), Arg::Int(hh)]
        )),
        prop::sample::select(vec![gl::LESS, gl::LEQUAL, gl::ALWAYS])
            .prop_map(move |f| c(Op::DepthFunc, vec![Arg::Enum(f)])),
        prop::sample::select(vec![gl::SRC_ALPHA, gl::ONE, gl::ZERO]).prop_map(move |f| c(
            Op::BlendFunc,
            vec![Arg::Enum(f), Arg::Enum(gl::ONE_MINUS_SRC_ALPHA)]
        )),
        (1u8..4).prop_map(move |w| c(Op::LineWidth, vec![Arg::Float(w as f32)])),
        (any::<bool>(), any::<bool>()).prop_map(move |(r, a)| c(
            Op::ColorMask,
            vec![Arg::Bool(r), Arg::Bool(true), Arg::Bool(true), Arg::Bool(a)]
        )),
        prop::sample::select(vec![1, 2, 4, 8]).prop_map(move |a| c(
            Op::PixelStorei,
            vec![Arg::Enum(gl::UNPACK_ALIGNMENT), Arg::Int(a)]
        )),
    ]
    .boxed()
}

fn state_command() -> impl Strategy<Value = Command> {
    prop_oneof![binding_command(), value_command()]
}

fn folded(commands: &[Command]) -> GlState {
    let mut buffer = CommandBuffer::new(1, true);
    for command in commands {
        buffer.push(command.clone());
    }
    GlState::create_end_state_from_command_buffer(&GlState::new(layout()), &buffer)
}

#[test]
fn fresh_context_captures_as_defaults() {
    let (mut ctx, registry) = fixture();
    assert_eq!(capture(&mut ctx, &registry), GlState::new(layout()));
}

#[test]
fn unresolved_handles_fail_before_any_call() {
    let (mut ctx, registry) = fixture();
    let state = folded(&[Command::new(Op::UseProgram, vec![h(99)])]);
    assert_eq!(
        state.force_apply(&mut ctx, &registry),
        Err(StateError::UnresolvedHandle(Handle::from_raw(99)))
    );
    assert_eq!(ctx.calls(), 0);
}

#[test]
fn divergence_is_reported_by_parameter() {
    let (mut ctx, registry) = fixture();
    let state = folded(&[Command::new(Op::Enable, vec![Arg::Enum(gl::BLEND)])]);
    state.force_apply(&mut ctx, &registry).unwrap();
    assert!(diverged_parameters(&state, &mut ctx, &registry).is_empty());

    ctx.disable(gl::BLEND);
    ctx.depth_func(gl::ALWAYS);
    let diverged = diverged_parameters(&state, &mut ctx, &registry);
    assert_eq!(diverged.len(), 2, "{diverged:?}");
    assert!(diverged.iter().any(|d| d.starts_with("capability")));
}

#[test]
fn unbound_texture_objects_are_synchronized() {
    let (mut ctx, registry) = fixture();
    let state = folded(&[
        Command::new(Op::BindTexture, vec![Arg::Enum(gl::TEXTURE_2D), h(TEX_A)]),
        Command::new(
            Op::TexParameteri,
            vec![
                Arg::Enum(gl::TEXTURE_2D),
                Arg::Enum(gl::TEXTURE_MAG_FILTER),
                Arg::Int(gl::NEAREST as i32),
            ],
        ),
        Command::new(Op::BindTexture, vec![Arg::Enum(gl::TEXTURE_2D), h(0)]),
    ]);
    state.force_apply(&mut ctx, &registry).unwrap();

    let native = registry.resolve(Handle::from_raw(TEX_A)).unwrap();
    ctx.bind_texture(gl::TEXTURE_2D, native);
    assert_eq!(
        ctx.get_tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER),
        gl::NEAREST as i32
    );
}

proptest! {
    #[test]
    fn force_apply_reproduces_the_folded_state(
        commands in prop::collection::vec(state_command(), 0..40),
    ) {
        let expected = folded(&commands);
        let (mut ctx, registry) = fixture();
        expected.force_apply(&mut ctx, &registry).unwrap();
        prop_assert_eq!(ctx.get_error(), gl::NO_ERROR);
        let live = capture(&mut ctx, &registry);
        prop_assert!(live == expected, "{:?}", expected.differences(&live));
    }

    #[test]
    fn diff_matches_force_with_fewer_calls(
        first in prop::collection::vec(state_command(), 0..30),
        second in prop::collection::vec(state_command(), 0..30),
    ) {
        let from = folded(&first);
        let to = folded(&second);

        let (mut forced, registry) = fixture();
        to.force_apply(&mut forced, &registry).unwrap();
        let force_calls = forced.calls();

        let (mut diffed, registry) = fixture();
        from.force_apply(&mut diffed, &registry).unwrap();
        diffed.reset_calls();
        to.apply_diff(&from, &mut diffed, &registry).unwrap();
        prop_assert!(diffed.calls() < force_calls);

        let a = capture(&mut forced, &registry);
        let b = capture(&mut diffed, &registry);
        prop_assert!(a == to, "{:?}", to.differences(&a));
        prop_assert!(b == to, "{:?}", to.differences(&b));
    }

    #[test]
    fn diff_against_itself_issues_nothing(
        commands in prop::collection::vec(state_command(), 0..30),
    ) {
        let state = folded(&commands);
        let (mut ctx, registry) = fixture();
        state.force_apply(&mut ctx, &registry).unwrap();
        ctx.reset_calls();
        state.apply_diff(&state, &mut ctx, &registry).unwrap();
        prop_assert_eq!(ctx.calls(), 0);
    }
}
