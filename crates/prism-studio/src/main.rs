//! Operator console for the ray-marcher.
//!
//! Loads one object per fragment file given on the command line, then reads
//! commands from stdin:
//!
//! ```text
//! render                         draw one frame and summarize driver calls
//! reload                         hot-reload shared and per-object sources
//! set  <object> <name> <f32>..   set a float/vec2/vec3/vec4 property
//! seti <object> <name> <i32>     set an int (or sampler) property
//! list                           show objects and their shaders
//! quit
//! ```
//!
//! Usage: `prism-studio [--config prism.toml] object.glsl [more.glsl ...]`

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, bail};
use glam::{Vec2, Vec3, Vec4};
use prism_engine::backend::HeadlessBackend;
use prism_engine::backend::headless::{BackendEvent, HeadlessMesh};
use prism_engine::config::EngineConfig;
use prism_engine::logging::{LoggingConfig, init_logging};
use prism_engine::material::Material;
use prism_engine::render::{Camera, RayMarcher, SdfObject};

struct Args {
    config: Option<PathBuf>,
    objects: Vec<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut config = None;
    let mut objects = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            config = Some(PathBuf::from(args.next().context("--config needs a path")?));
        } else {
            objects.push(PathBuf::from(arg));
        }
    }

    if objects.is_empty() {
        bail!("usage: prism-studio [--config prism.toml] object.glsl [more.glsl ...]");
    }
    Ok(Args { config, objects })
}

struct Studio {
    backend: Rc<HeadlessBackend>,
    marcher: RayMarcher,
    materials: Vec<Rc<RefCell<Material>>>,
}

impl Studio {
    fn new(config: &EngineConfig, objects: &[PathBuf]) -> anyhow::Result<Self> {
        let backend = Rc::new(HeadlessBackend::new());
        let mut marcher = RayMarcher::from_config(backend.clone(), config);
        marcher.set_camera(Some(Rc::new(RefCell::new(Camera::default()))));

        let mut materials = Vec::new();
        for path in objects {
            let fragment = config.shader_path(path);
            let shader = marcher
                .create_shader(&fragment)
                .with_context(|| format!("loading {}", fragment.display()))?;
            let material = Rc::new(RefCell::new(Material::with_max_texture_units(
                shader,
                config.max_texture_units,
            )));

            let label = path.display().to_string();
            let mesh = Rc::new(HeadlessMesh::world(backend.clone(), label));
            marcher.add_object(SdfObject::new(mesh, material.clone()));
            materials.push(material);
        }

        Ok(Self {
            backend,
            marcher,
            materials,
        })
    }

    fn material(&self, object: &str) -> anyhow::Result<&Rc<RefCell<Material>>> {
        let index: usize = object.parse().context("object must be an index")?;
        self.materials
            .get(index)
            .with_context(|| format!("no object {index}; there are {}", self.materials.len()))
    }

    fn run(&self, line: &str) -> anyhow::Result<bool> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => return Ok(false),
            ["render"] => self.render(),
            ["reload"] => {
                let report = self.marcher.reload_shaders();
                println!(
                    "  reload: {} recompiled, {} unchanged, {} failed",
                    report.recompiled, report.unchanged, report.failed
                );
            }
            ["list"] => self.list(),
            ["set", object, name, values @ ..] => {
                let values = values
                    .iter()
                    .map(|v| v.parse::<f32>())
                    .collect::<Result<Vec<_>, _>>()
                    .context("values must be numbers")?;
                let mut material = self.material(object)?.borrow_mut();
                let stored = match values.as_slice() {
                    [x] => material.set_property_value(*name, x),
                    [x, y] => material.set_property_value(*name, &Vec2::new(*x, *y)),
                    [x, y, z] => material.set_property_value(*name, &Vec3::new(*x, *y, *z)),
                    [x, y, z, w] => material.set_property_value(*name, &Vec4::new(*x, *y, *z, *w)),
                    _ => bail!("expected 1 to 4 values"),
                };
                report_stored(name, stored);
            }
            ["seti", object, name, value] => {
                let value: i32 = value.parse().context("value must be an integer")?;
                let stored = self.material(object)?.borrow_mut().set_property_value(*name, &value);
                report_stored(name, stored);
            }
            _ => println!("  unknown command: {line}"),
        }
        Ok(true)
    }

    fn render(&self) {
        self.backend.take_trace();
        self.marcher.render();

        let (mut binds, mut writes, mut draws) = (0, 0, 0);
        for event in self.backend.take_trace() {
            match event {
                BackendEvent::UseProgram(_) => binds += 1,
                BackendEvent::SetUniform { .. } => writes += 1,
                BackendEvent::Draw { .. } => draws += 1,
                BackendEvent::BindTexture { .. } => {}
            }
        }
        println!("  frame: {binds} program binds, {writes} uniform writes, {draws} draws");
    }

    fn list(&self) {
        for (i, material) in self.materials.iter().enumerate() {
            let material = material.borrow();
            let shader = material.shader();
            println!(
                "  [{i}] {}  generation {}  {} uniforms  {} properties",
                shader.label(),
                shader.generation(),
                shader.uniform_count(),
                material.property_count()
            );
        }
    }
}

fn report_stored(name: &str, stored: bool) {
    if stored {
        println!("  {name} set");
    } else {
        println!("  {name} not set (missing or wrong type)");
    }
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    init_logging(LoggingConfig::with_filter(config.log_filter.as_deref()));

    let studio = Studio::new(&config, &args.objects)?;
    log::info!("{} objects loaded from {}", args.objects.len(), config.shader_folder.display());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        match studio.run(line.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("  error: {e:#}"),
        }
        stdout.flush().ok();
    }

    Ok(())
}
