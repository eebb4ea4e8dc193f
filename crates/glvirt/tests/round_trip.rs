mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use common::{FRAGMENT_SHADER, VERTEX_SHADER};
use glium::texture::RawImage2d;
use glvirt::{bytes, Parameter, PixelBuffer, ProxyContext, Replayer, VirtConfig};
use glvirt_channel::framing::{deliver_responses, read_frame, write_frame};
use glvirt_channel::{ConsumerEnd, Frame};
use glvirt_core::{Arg, CommandBuffer, Envelope, Handle, Op, ResponseSlot};
use glvirt_state::{describe, GlContext, ParamValue, SoftContext};

fn spawn_consumer(consumer: ConsumerEnd) -> JoinHandle<(SoftContext, Replayer)> {
    glvirt_core::logging::init();
    thread::Builder::new()
        .name("replay".into())
        .spawn(move || {
            let mut ctx = SoftContext::default();
            let device = describe(&mut ctx);
            let mut replayer = Replayer::new(&mut ctx, device, &VirtConfig::default());
            replayer
                .serve(&mut ctx, &consumer, Duration::from_millis(5))
                .unwrap();
            (ctx, replayer)
        })
        .unwrap()
}

#[test]
fn handshake_describes_the_consumer_device() {
    let (producer, consumer) = glvirt_channel::connect();
    let replay = spawn_consumer(consumer);
    let proxy = ProxyContext::connect(producer, VirtConfig::default()).unwrap();

    let expected = describe(&mut SoftContext::default());
    assert_eq!(proxy.device(), &expected);
    assert!(matches!(
        proxy.get_parameter(gl::MAX_TEXTURE_SIZE),
        Some(Parameter::Limit(_))
    ));
    assert_eq!(
        proxy.get_parameter(gl::VIEWPORT),
        Some(Parameter::State(ParamValue::Ints4([0, 0, 300, 150])))
    );
    assert_eq!(
        proxy.get_parameter(gl::SHADING_LANGUAGE_VERSION),
        Some(Parameter::Text("330".into()))
    );

    drop(proxy);
    replay.join().unwrap();
}

#[test]
fn program_setup_answers_queries() {
    let (producer, consumer) = glvirt_channel::connect();
    let replay = spawn_consumer(consumer);
    let mut proxy = ProxyContext::connect(producer, VirtConfig::default()).unwrap();

    proxy.create_and_activate(false).unwrap();
    let vs = proxy.create_shader(gl::VERTEX_SHADER).unwrap();
    proxy.shader_source(vs, VERTEX_SHADER).unwrap();
    proxy.compile_shader(vs).unwrap();
    let fs = proxy.create_shader(gl::FRAGMENT_SHADER).unwrap();
    proxy.shader_source(fs, FRAGMENT_SHADER).unwrap();
    proxy.compile_shader(fs).unwrap();
    let program = proxy.create_program().unwrap();
    proxy.attach_shader(program, vs).unwrap();
    proxy.attach_shader(program, fs).unwrap();
    proxy.link_program(program).unwrap();

    assert_eq!(proxy.get_shader_parameter(vs, gl::COMPILE_STATUS).unwrap(), 1);
    assert_eq!(proxy.get_program_parameter(program, gl::LINK_STATUS).unwrap(), 1);
    assert_eq!(proxy.get_program_parameter(program, gl::ACTIVE_ATTRIBUTES).unwrap(), 2);
    assert!(proxy.get_attrib_location(program, "position").unwrap() >= 0);
    assert_eq!(proxy.get_attrib_location(program, "missing").unwrap(), -1);
    let attrib = proxy.get_active_attrib(program, 0).unwrap().unwrap();
    assert_eq!(attrib.name, "position");

    let tint = proxy.get_uniform_location(program, "tint").unwrap();
    assert_eq!(proxy.get_error().unwrap(), gl::NO_ERROR);

    proxy.create_and_activate(true).unwrap();
    proxy.use_program(program).unwrap();
    proxy.uniform4f(tint, 0.25, 0.5, 0.75, 1.0).unwrap();
    proxy.draw_arrays(gl::TRIANGLES, 0, 3).unwrap();
    proxy.execute().unwrap();

    drop(proxy);
    let (mut ctx, replayer) = replay.join().unwrap();
    let native = replayer.registry().resolve(program).unwrap();
    let location = ctx.get_uniform_location(native, "tint");
    assert_eq!(ctx.draw_calls(), 1);
    assert_eq!(
        ctx.uniform_value(native, location),
        Some(&[0.25, 0.5, 0.75, 1.0][..])
    );
}

#[test]
fn resource_reads_see_earlier_writes() {
    let (producer, consumer) = glvirt_channel::connect();
    let replay = spawn_consumer(consumer);
    let mut proxy = ProxyContext::connect(producer, VirtConfig::default()).unwrap();

    proxy.create_and_activate(false).unwrap();
    proxy.clear_color(0.0, 0.0, 1.0, 1.0).unwrap();
    proxy.clear(gl::COLOR_BUFFER_BIT).unwrap();
    let rgba = proxy
        .read_pixels(0, 0, 2, 1, gl::RGBA, gl::UNSIGNED_BYTE)
        .unwrap();
    assert_eq!(rgba, [0, 0, 255, 255, 0, 0, 255, 255]);

    proxy.finish().unwrap();
    assert_eq!(proxy.get_error().unwrap(), gl::NO_ERROR);

    drop(proxy);
    replay.join().unwrap();
}

#[test]
fn uploaded_images_reach_the_consumer_texture() {
    let (producer, consumer) = glvirt_channel::connect();
    let replay = spawn_consumer(consumer);
    let mut proxy = ProxyContext::connect(producer, VirtConfig::default()).unwrap();

    proxy.create_and_activate(false).unwrap();
    let texture = proxy.create_texture().unwrap();
    proxy.bind_texture(gl::TEXTURE_2D, texture).unwrap();
    let base = PixelBuffer::solid(2, 2, [10, 20, 30, 255]);
    proxy
        .tex_image_2d_from(gl::TEXTURE_2D, 0, gl::RGBA as i32, &base)
        .unwrap();
    let patch = RawImage2d::from_raw_rgba(vec![200u8, 100, 50, 255], (1, 1));
    proxy
        .tex_sub_image_2d_from(gl::TEXTURE_2D, 0, 1, 0, &patch)
        .unwrap();

    let framebuffer = proxy.create_framebuffer().unwrap();
    proxy.bind_framebuffer(gl::FRAMEBUFFER, framebuffer).unwrap();
    proxy
        .framebuffer_texture_2d(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, texture, 0)
        .unwrap();
    let rgba = proxy
        .read_pixels(0, 0, 2, 2, gl::RGBA, gl::UNSIGNED_BYTE)
        .unwrap();
    assert_eq!(
        rgba,
        [
            10, 20, 30, 255, 200, 100, 50, 255, //
            10, 20, 30, 255, 10, 20, 30, 255,
        ]
    );
    assert_eq!(proxy.get_error().unwrap(), gl::NO_ERROR);

    drop(proxy);
    let (mut ctx, replayer) = replay.join().unwrap();
    assert!(ctx.is_texture(replayer.registry().resolve(texture).unwrap()));
    assert_eq!(ctx.get_error(), gl::NO_ERROR);
}

#[test]
fn stream_transport_answers_by_buffer() {
    let mut ctx = SoftContext::default();
    let device = describe(&mut ctx);
    let mut replayer = Replayer::new(&mut ctx, device.clone(), &VirtConfig::default());

    let slot = Arc::new(ResponseSlot::new());
    let mut buffer = CommandBuffer::new(7, false);
    buffer.add_message_with_handle(Op::CreateTexture, vec![], Handle::from_raw(1));
    buffer.add_message(
        Op::BindTexture,
        vec![Arg::Enum(gl::TEXTURE_2D), Handle::from_raw(1).into()],
    );
    buffer.add_message_and_wait(Op::GetError, vec![], Arc::clone(&slot));
    let envelope = Envelope::from_buffer(0, &mut buffer);

    let mut input = Vec::new();
    write_frame(&mut input, &Frame::Buffer(envelope.message)).unwrap();
    let mut output = Vec::new();
    replayer
        .serve_stream(&mut ctx, &mut Cursor::new(input), &mut output)
        .unwrap();

    let mut output = Cursor::new(output);
    let Some(Frame::Description(announced)) = read_frame(&mut output).unwrap() else {
        panic!("expected the device description first");
    };
    assert_eq!(announced, device);
    let Some(Frame::Responses { buffer_id, payloads }) = read_frame(&mut output).unwrap() else {
        panic!("expected responses");
    };
    assert_eq!(buffer_id, 7);
    deliver_responses(buffer_id, &envelope.responses, payloads).unwrap();

    let error = bytes::decode_enum(&slot.take_payload().unwrap()).unwrap();
    assert_eq!(error, gl::NO_ERROR);
    let native = replayer.registry().resolve(Handle::from_raw(1)).unwrap();
    assert_eq!(ctx.get_integer(gl::TEXTURE_BINDING_2D) as u32, native);
    assert!(read_frame(&mut output).unwrap().is_none());
}
