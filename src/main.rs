use crossterm::{
    cursor,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton, MouseEventKind},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, ClearType, DisableLineWrap, EnableLineWrap, EndSynchronizedUpdate,
        EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    cmp::Ordering,
    f32::consts::{PI, TAU},
    io::{self, Stdout, Write},
    time::{Duration, Instant},
};

const FPS_CAP: u64 = 30;
const ASPECT_X: f32 = 0.55;

// Per-frame increments. Motion is tied to the frame callback, not wall time;
// the FPS cap keeps the real-time rate roughly uniform.
const BASE_RATE: f32 = 0.01;
const PLANET_SPIN_RATE: f32 = 0.05;
const SUN_SPIN_RATE: f32 = 0.002;

const SUN_SIZE: f32 = 3.0;
const STAR_COUNT: usize = 600;
const STAR_RANGE: f32 = 1000.0;

const NEAR: f32 = 0.1;
const MIN_DIST: f32 = 20.0;
const MAX_DIST: f32 = 100.0;
const MAX_PITCH: f32 = 1.45;

const SPEED_STEP: f32 = 0.25;

// -------------------- Shared math --------------------
#[derive(Clone, Copy, Debug, PartialEq)]
struct Vec3 {
    x: f32,
    y: f32,
    z: f32,
}

impl Vec3 {
    fn new(x: f32, y: f32, z: f32) -> Vec3 {
        Vec3 { x, y, z }
    }
    fn add(self, o: Vec3) -> Vec3 {
        Vec3 { x: self.x + o.x, y: self.y + o.y, z: self.z + o.z }
    }
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3 { x: self.x - o.x, y: self.y - o.y, z: self.z - o.z }
    }
    fn scale(self, k: f32) -> Vec3 {
        Vec3 { x: self.x * k, y: self.y * k, z: self.z * k }
    }
    fn dot(self, o: Vec3) -> f32 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }
    fn cross(self, o: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * o.z - self.z * o.y,
            y: self.z * o.x - self.x * o.z,
            z: self.x * o.y - self.y * o.x,
        }
    }
    fn len(self) -> f32 {
        self.dot(self).sqrt()
    }
    fn norm(self) -> Vec3 {
        let l = self.len().max(1e-6);
        self.scale(1.0 / l)
    }
}

fn clamp01(x: f32) -> f32 {
    x.max(0.0).min(1.0)
}

fn deg(x: f32) -> f32 {
    x * PI / 180.0
}

#[derive(Clone, Copy)]
struct Ray {
    origin: Vec3,
    dir: Vec3,
}

/// Nearest positive parameter along `ray` where it enters (or, from inside,
/// exits) the sphere. `ray.dir` must be normalized.
fn ray_sphere(ray: Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin.sub(center);
    let b = oc.dot(ray.dir);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();
    let t0 = -b - s;
    if t0 > 1e-4 {
        return Some(t0);
    }
    let t1 = -b + s;
    if t1 > 1e-4 {
        return Some(t1);
    }
    None
}

// -------------------- Camera --------------------
// Orbit camera around the origin. `to_ndc` and `ray_through` go through the
// same basis, so projecting a point and casting a ray back through the
// resulting coordinate land on the same line of sight.
#[derive(Clone, Copy)]
struct Camera {
    yaw: f32,
    pitch: f32,
    dist: f32,
    fov_y: f32,
}

impl Camera {
    fn new() -> Camera {
        Camera { yaw: 0.0, pitch: 0.55, dist: 50.0, fov_y: deg(75.0) }
    }

    fn eye(self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(self.dist * cp * sy, self.dist * sp, self.dist * cp * cy)
    }

    /// Right/up/forward basis; forward points from the eye at the origin.
    fn basis(self) -> (Vec3, Vec3, Vec3) {
        let fwd = self.eye().scale(-1.0).norm();
        let right = fwd.cross(Vec3::new(0.0, 1.0, 0.0)).norm();
        let up = right.cross(fwd);
        (right, up, fwd)
    }

    /// Normalized device coordinate of `p` plus its view depth, or None when
    /// the point is at or behind the near plane.
    fn to_ndc(self, p: Vec3, aspect: f32) -> Option<(f32, f32, f32)> {
        let (right, up, fwd) = self.basis();
        let d = p.sub(self.eye());
        let z = d.dot(fwd);
        if z <= NEAR {
            return None;
        }
        let th = (self.fov_y * 0.5).tan();
        let x = d.dot(right) / (z * th * aspect);
        let y = d.dot(up) / (z * th);
        Some((x, y, z))
    }

    fn ray_through(self, ndc_x: f32, ndc_y: f32, aspect: f32) -> Ray {
        let (right, up, fwd) = self.basis();
        let th = (self.fov_y * 0.5).tan();
        let dir = fwd
            .add(right.scale(ndc_x * th * aspect))
            .add(up.scale(ndc_y * th))
            .norm();
        Ray { origin: self.eye(), dir }
    }

    fn orbit(&mut self, dyaw: f32, dpitch: f32) {
        self.yaw += dyaw;
        self.pitch = (self.pitch + dpitch).clamp(-MAX_PITCH, MAX_PITCH);
    }

    fn zoom_by(&mut self, factor: f32) {
        self.dist = (self.dist * factor).clamp(MIN_DIST, MAX_DIST);
    }
}

/// Pointer cell inside the viewport to [-1,1] NDC, origin at the viewport
/// center, y flipped relative to screen rows.
fn cell_to_ndc(col: u16, row: u16, vw: u16, vh: u16) -> (f32, f32) {
    let x = ((col as f32 + 0.5) / vw.max(1) as f32) * 2.0 - 1.0;
    let y = -(((row as f32 + 0.5) / vh.max(1) as f32) * 2.0 - 1.0);
    (x, y)
}

fn ndc_to_cell(ndc_x: f32, ndc_y: f32, vw: u16, vh: u16) -> (f32, f32) {
    let x = (ndc_x * 0.5 + 0.5) * vw as f32;
    let y = (0.5 - ndc_y * 0.5) * vh as f32;
    (x, y)
}

// -------------------- Scene --------------------
#[derive(Clone, Copy)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl Rgb {
    fn to_color(self) -> Color {
        Color::Rgb { r: self.r, g: self.g, b: self.b }
    }
}

fn scale_rgb(c: Rgb, t: f32) -> Rgb {
    let t = clamp01(t);
    Rgb {
        r: (c.r as f32 * t) as u8,
        g: (c.g as f32 * t) as u8,
        b: (c.b as f32 * t) as u8,
    }
}

struct PlanetSpec {
    name: &'static str,
    size: f32,
    distance: f32,
    color: Rgb,
}

const PLANETS: &[PlanetSpec] = &[
    PlanetSpec { name: "mercury", size: 0.8, distance: 5.0, color: Rgb { r: 140, g: 140, b: 140 } },
    PlanetSpec { name: "venus", size: 1.8, distance: 7.0, color: Rgb { r: 230, g: 230, b: 184 } },
    PlanetSpec { name: "earth", size: 2.0, distance: 10.0, color: Rgb { r: 34, g: 51, b: 255 } },
    PlanetSpec { name: "mars", size: 1.0, distance: 13.0, color: Rgb { r: 193, g: 68, b: 14 } },
    PlanetSpec { name: "jupiter", size: 5.0, distance: 18.0, color: Rgb { r: 216, g: 202, b: 157 } },
    PlanetSpec { name: "saturn", size: 4.4, distance: 23.0, color: Rgb { r: 227, g: 176, b: 89 } },
    PlanetSpec { name: "uranus", size: 3.6, distance: 28.0, color: Rgb { r: 85, g: 128, b: 170 } },
    PlanetSpec { name: "neptune", size: 3.6, distance: 33.0, color: Rgb { r: 54, g: 104, b: 150 } },
];

struct Planet {
    name: &'static str,
    size: f32,
    distance: f32,
    color: Rgb,
    angle: f32,
    speed: f32,
    spin: f32,
}

impl Planet {
    /// Position is always derived from (angle, distance), never stored.
    fn position(&self) -> Vec3 {
        Vec3::new(self.distance * self.angle.cos(), 0.0, self.distance * self.angle.sin())
    }
}

struct Sun {
    size: f32,
    spin: f32,
}

struct OrbitRing {
    radius: f32,
}

#[derive(Clone, Copy)]
struct Star {
    pos: Vec3,
    mag: f32,
}

struct StarField {
    stars: Vec<Star>,
}

fn build_star_field(rng: &mut StdRng, count: usize) -> StarField {
    let mut stars = Vec::with_capacity(count);
    for _ in 0..count {
        stars.push(Star {
            pos: Vec3::new(
                rng.gen_range(-STAR_RANGE..STAR_RANGE),
                rng.gen_range(-STAR_RANGE..STAR_RANGE),
                rng.gen_range(-STAR_RANGE..STAR_RANGE),
            ),
            mag: rng.gen_range(0.3..1.0),
        });
    }
    StarField { stars }
}

struct Scene {
    sun: Sun,
    planets: Vec<Planet>,
    rings: Vec<OrbitRing>,
    stars: StarField,
}

impl Scene {
    fn new(rng: &mut StdRng) -> Scene {
        let planets = PLANETS
            .iter()
            .map(|spec| Planet {
                name: spec.name,
                size: spec.size,
                distance: spec.distance,
                color: spec.color,
                angle: rng.gen_range(0.0..TAU),
                speed: 1.0,
                spin: 0.0,
            })
            .collect();
        let rings = PLANETS.iter().map(|spec| OrbitRing { radius: spec.distance }).collect();
        Scene {
            sun: Sun { size: SUN_SIZE, spin: 0.0 },
            planets,
            rings,
            stars: build_star_field(rng, STAR_COUNT),
        }
    }
}

// -------------------- Orbit updater --------------------
/// One fixed step: advance every orbital angle by BASE_RATE times the
/// planet's speed multiplier, then the self-rotation phases. Zero and
/// negative speeds are ordinary inputs.
fn advance(scene: &mut Scene) {
    scene.sun.spin += SUN_SPIN_RATE;
    for p in &mut scene.planets {
        p.angle += BASE_RATE * p.speed;
        p.spin += PLANET_SPIN_RATE;
    }
}

// -------------------- Pointer picker --------------------
#[derive(Clone, Copy, Debug, PartialEq)]
struct Hit {
    index: usize,
    t: f32,
}

/// Casts a ray through the NDC point and returns the nearest planet whose
/// bounding sphere it crosses. O(n) over the fixed set of eight.
fn pick(scene: &Scene, cam: Camera, ndc_x: f32, ndc_y: f32, aspect: f32) -> Option<Hit> {
    let ray = cam.ray_through(ndc_x, ndc_y, aspect);
    let mut best: Option<Hit> = None;
    for (index, p) in scene.planets.iter().enumerate() {
        if let Some(t) = ray_sphere(ray, p.position(), p.size) {
            if best.map_or(true, |b| t < b.t) {
                best = Some(Hit { index, t });
            }
        }
    }
    best
}

fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// -------------------- Themes --------------------
#[derive(Clone, Copy)]
struct Theme {
    name: &'static str,
    bg: Color,
    fg: Color,
    dim: Color,
    edge: Color,
    ring: Color,
    star: Rgb,
    label_fg: Color,
    label_bg: Color,
}

const THEMES: [Theme; 2] = [
    Theme {
        name: "dark",
        bg: Color::Black,
        fg: Color::Rgb { r: 220, g: 220, b: 220 },
        dim: Color::Rgb { r: 120, g: 120, b: 120 },
        edge: Color::Rgb { r: 80, g: 95, b: 120 },
        ring: Color::Rgb { r: 90, g: 100, b: 115 },
        star: Rgb { r: 220, g: 220, b: 235 },
        label_fg: Color::Rgb { r: 240, g: 240, b: 240 },
        label_bg: Color::Rgb { r: 35, g: 35, b: 45 },
    },
    Theme {
        name: "light",
        bg: Color::Rgb { r: 250, g: 250, b: 252 },
        fg: Color::Rgb { r: 35, g: 35, b: 45 },
        dim: Color::Rgb { r: 120, g: 125, b: 135 },
        edge: Color::Rgb { r: 150, g: 160, b: 180 },
        ring: Color::Rgb { r: 170, g: 175, b: 190 },
        star: Rgb { r: 110, g: 110, b: 125 },
        label_fg: Color::Rgb { r: 20, g: 20, b: 25 },
        label_bg: Color::Rgb { r: 225, g: 225, b: 232 },
    },
];

// -------------------- Cell grid + diff render --------------------
#[derive(Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl Cell {
    fn blank(bg: Color) -> Cell {
        Cell { ch: ' ', fg: Color::Reset, bg }
    }

    /// Never equal to any rendered cell; a diff buffer seeded with this
    /// repaints in full on its first flush.
    fn invalid() -> Cell {
        Cell { ch: '\0', fg: Color::Reset, bg: Color::Reset }
    }
}

struct Grid {
    w: u16,
    h: u16,
    cells: Vec<Cell>,
}

impl Grid {
    fn new(w: u16, h: u16, bg: Color) -> Grid {
        Grid { w, h, cells: vec![Cell::blank(bg); w as usize * h as usize] }
    }

    fn clear(&mut self, bg: Color) {
        for c in self.cells.iter_mut() {
            *c = Cell::blank(bg);
        }
    }

    fn put(&mut self, x: i32, y: i32, ch: char, fg: Color, bg: Color) {
        if x < 0 || y < 0 || x >= self.w as i32 || y >= self.h as i32 {
            return;
        }
        self.cells[y as usize * self.w as usize + x as usize] = Cell { ch, fg, bg };
    }

    fn get(&self, x: i32, y: i32) -> Option<Cell> {
        if x < 0 || y < 0 || x >= self.w as i32 || y >= self.h as i32 {
            return None;
        }
        Some(self.cells[y as usize * self.w as usize + x as usize])
    }

    fn text(&mut self, x: i32, y: i32, s: &str, fg: Color, bg: Color) {
        let mut xi = x;
        for ch in s.chars() {
            self.put(xi, y, ch, fg, bg);
            xi += 1;
        }
    }

    fn frame(&mut self, x0: u16, y0: u16, bw: u16, bh: u16, fg: Color, bg: Color) {
        if bw < 2 || bh < 2 {
            return;
        }
        let x1 = (x0 + bw - 1) as i32;
        let y1 = (y0 + bh - 1) as i32;
        for x in x0 as i32 + 1..x1 {
            self.put(x, y0 as i32, '─', fg, bg);
            self.put(x, y1, '─', fg, bg);
        }
        for y in y0 as i32 + 1..y1 {
            self.put(x0 as i32, y, '│', fg, bg);
            self.put(x1, y, '│', fg, bg);
        }
        self.put(x0 as i32, y0 as i32, '┌', fg, bg);
        self.put(x1, y0 as i32, '┐', fg, bg);
        self.put(x0 as i32, y1, '└', fg, bg);
        self.put(x1, y1, '┘', fg, bg);
    }

    fn flush_diff(&self, out: &mut Stdout, prev: &mut [Cell]) -> io::Result<()> {
        let mut cur_fg = Color::Reset;
        let mut cur_bg = Color::Reset;
        for y in 0..self.h as usize {
            for x in 0..self.w as usize {
                let i = y * self.w as usize + x;
                if prev[i] == self.cells[i] {
                    continue;
                }
                prev[i] = self.cells[i];
                let c = self.cells[i];
                queue!(out, cursor::MoveTo(x as u16, y as u16))?;
                if c.bg != cur_bg {
                    cur_bg = c.bg;
                    queue!(out, SetBackgroundColor(cur_bg))?;
                }
                if c.fg != cur_fg {
                    cur_fg = c.fg;
                    queue!(out, SetForegroundColor(cur_fg))?;
                }
                queue!(out, Print(c.ch))?;
            }
        }
        Ok(())
    }
}

// -------------------- Scene renderer --------------------
const SHADE_RAMP: [char; 4] = ['░', '▒', '▓', '█'];

#[derive(Clone, Copy)]
enum BodyKind {
    Sun,
    Planet(usize),
}

fn render_stars(grid: &mut Grid, theme: &Theme, field: &StarField, cam: Camera, vw: u16, vh: u16, aspect: f32) {
    for s in &field.stars {
        let Some((nx, ny, _)) = cam.to_ndc(s.pos, aspect) else {
            continue;
        };
        if nx.abs() > 1.0 || ny.abs() > 1.0 {
            continue;
        }
        let (cx, cy) = ndc_to_cell(nx, ny, vw, vh);
        let ch = if s.mag > 0.85 {
            '✦'
        } else if s.mag > 0.6 {
            '•'
        } else {
            '·'
        };
        let fg = scale_rgb(theme.star, 0.35 + 0.65 * s.mag).to_color();
        grid.put(cx as i32, cy as i32, ch, fg, theme.bg);
    }
}

fn render_rings(grid: &mut Grid, theme: &Theme, rings: &[OrbitRing], cam: Camera, vw: u16, vh: u16, aspect: f32) {
    for ring in rings {
        let steps = 180;
        for s in 0..steps {
            if s % 2 != 0 {
                continue;
            }
            let a = TAU * s as f32 / steps as f32;
            let p = Vec3::new(ring.radius * a.cos(), 0.0, ring.radius * a.sin());
            let Some((nx, ny, _)) = cam.to_ndc(p, aspect) else {
                continue;
            };
            let (cx, cy) = ndc_to_cell(nx, ny, vw, vh);
            if cx < 0.0 || cy < 0.0 || cx >= vw as f32 || cy >= vh as f32 {
                continue;
            }
            grid.put(cx as i32, cy as i32, '·', theme.ring, theme.bg);
        }
    }
}

/// Half-height of a sphere's projected disc in cell rows.
fn disc_rows(size: f32, depth: f32, fov_y: f32, vh: u16) -> f32 {
    let th = (fov_y * 0.5).tan();
    (size / depth) / th * (vh as f32 * 0.5)
}

fn render_planet(
    grid: &mut Grid,
    theme: &Theme,
    p: &Planet,
    cam: Camera,
    vw: u16,
    vh: u16,
    aspect: f32,
) {
    let pos = p.position();
    let Some((nx, ny, depth)) = cam.to_ndc(pos, aspect) else {
        return;
    };
    let (cx, cy) = ndc_to_cell(nx, ny, vw, vh);
    let rows = disc_rows(p.size, depth, cam.fov_y, vh);
    if rows < 0.55 {
        if cx >= 0.0 && cy >= 0.0 && cx < vw as f32 && cy < vh as f32 {
            grid.put(cx as i32, cy as i32, '●', p.color.to_color(), theme.bg);
        }
        return;
    }

    // Light reaches the surface from the sun at the origin; express it in
    // screen space (y grows downward, z toward the viewer).
    let (right, up, fwd) = cam.basis();
    let l = pos.scale(-1.0).norm();
    let lx = l.dot(right);
    let ly = -l.dot(up);
    let lz = -l.dot(fwd);

    let ry = rows;
    let rx = rows / ASPECT_X;
    let y_span = ry.ceil() as i32;
    let x_span = rx.ceil() as i32;
    for dy in -y_span..=y_span {
        for dx in -x_span..=x_span {
            let sx = dx as f32 * ASPECT_X / ry;
            let sy = dy as f32 / ry;
            let d2 = sx * sx + sy * sy;
            if d2 > 1.0 {
                continue;
            }
            let gx = cx as i32 + dx;
            let gy = cy as i32 + dy;
            if gx < 0 || gy < 0 || gx >= vw as i32 || gy >= vh as i32 {
                continue;
            }
            let sz = (1.0 - d2).sqrt();
            let ndotl = (sx * lx + sy * ly + sz * lz).max(0.0);
            let lon = sx.atan2(sz);
            let band = 0.9 + 0.1 * (lon * 3.0 + p.spin).sin();
            let intensity = clamp01(0.12 + ndotl.powf(0.9) * band);
            let ch = SHADE_RAMP[(intensity * 3.99) as usize];
            let fg = scale_rgb(p.color, 0.45 + 0.55 * intensity).to_color();
            grid.put(gx, gy, ch, fg, theme.bg);
        }
    }
}

fn render_sun(grid: &mut Grid, theme: &Theme, sun: &Sun, cam: Camera, vw: u16, vh: u16, aspect: f32) {
    let Some((nx, ny, depth)) = cam.to_ndc(Vec3::new(0.0, 0.0, 0.0), aspect) else {
        return;
    };
    let (cx, cy) = ndc_to_cell(nx, ny, vw, vh);
    let rows = disc_rows(sun.size, depth, cam.fov_y, vh).max(0.6);
    let core = Rgb { r: 255, g: 220, b: 60 };
    let glow = Rgb { r: 255, g: 200, b: 110 };
    let y_span = (rows * 1.35).ceil() as i32;
    let x_span = (rows * 1.35 / ASPECT_X).ceil() as i32;
    for dy in -y_span..=y_span {
        for dx in -x_span..=x_span {
            let sx = dx as f32 * ASPECT_X / rows;
            let sy = dy as f32 / rows;
            let d2 = sx * sx + sy * sy;
            let gx = cx as i32 + dx;
            let gy = cy as i32 + dy;
            if gx < 0 || gy < 0 || gx >= vw as i32 || gy >= vh as i32 {
                continue;
            }
            if d2 <= 1.0 {
                // Limb darkening with a slow shimmer driven by the spin phase.
                let shimmer = 0.06 * (sx.atan2(sy) * 4.0 + sun.spin * 3.0).sin();
                let intensity = clamp01(1.0 - 0.35 * d2 + shimmer);
                let ch = SHADE_RAMP[(intensity * 3.99) as usize];
                grid.put(gx, gy, ch, scale_rgb(core, 0.7 + 0.3 * intensity).to_color(), theme.bg);
            } else if d2 <= 1.8 && (dx + dy).rem_euclid(2) == 0 {
                if let Some(c) = grid.get(gx, gy) {
                    if c.ch == ' ' {
                        grid.put(gx, gy, '░', scale_rgb(glow, 0.6).to_color(), theme.bg);
                    }
                }
            }
        }
    }
}

fn render_scene(grid: &mut Grid, theme: &Theme, scene: &Scene, cam: Camera, vw: u16, vh: u16) {
    let aspect = (vw as f32 * ASPECT_X) / vh.max(1) as f32;

    render_stars(grid, theme, &scene.stars, cam, vw, vh, aspect);
    render_rings(grid, theme, &scene.rings, cam, vw, vh, aspect);

    // Painter's algorithm over the closed body set, far to near.
    let mut draws: Vec<(f32, BodyKind)> = Vec::with_capacity(scene.planets.len() + 1);
    if let Some((_, _, depth)) = cam.to_ndc(Vec3::new(0.0, 0.0, 0.0), aspect) {
        draws.push((depth, BodyKind::Sun));
    }
    for (i, p) in scene.planets.iter().enumerate() {
        if let Some((_, _, depth)) = cam.to_ndc(p.position(), aspect) {
            draws.push((depth, BodyKind::Planet(i)));
        }
    }
    draws.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    for (_, kind) in &draws {
        match kind {
            BodyKind::Sun => render_sun(grid, theme, &scene.sun, cam, vw, vh, aspect),
            BodyKind::Planet(i) => render_planet(grid, theme, &scene.planets[*i], cam, vw, vh, aspect),
        }
    }
}

/// Hover label, offset from the pointer like a tooltip. Drawn as the last
/// pass so nothing paints over it.
fn render_label(
    grid: &mut Grid,
    theme: &Theme,
    scene: &Scene,
    hover: Option<usize>,
    mouse: Option<(u16, u16)>,
) {
    if let (Some(i), Some((mc, mr))) = (hover, mouse) {
        let label = format!(" {} ", display_name(scene.planets[i].name));
        grid.text(mc as i32 + 2, mr as i32 + 1, &label, theme.label_fg, theme.label_bg);
    }
}

// -------------------- HUD --------------------
#[allow(clippy::too_many_arguments)]
fn render_hud(
    grid: &mut Grid,
    theme: &Theme,
    scene: &Scene,
    cam: Camera,
    hud_x: u16,
    hud_w: u16,
    h: u16,
    paused: bool,
    selected: usize,
    hover: Option<usize>,
) {
    for y in 0..h {
        grid.put(hud_x as i32, y as i32, '│', theme.edge, theme.bg);
    }

    let top_h = 8u16.min(h);
    grid.frame(hud_x, 0, hud_w, top_h, theme.edge, theme.bg);
    let px = hud_x as i32 + 2;
    grid.text(px, 1, "solarium", theme.fg, theme.bg);
    grid.text(
        px,
        2,
        &format!("state: {}", if paused { "paused" } else { "running" }),
        theme.dim,
        theme.bg,
    );
    grid.text(px, 3, &format!("theme: {}", theme.name), theme.dim, theme.bg);
    grid.text(px, 4, &format!("dist:  {:.0}", cam.dist), theme.dim, theme.bg);
    let hover_name = hover
        .map(|i| display_name(scene.planets[i].name))
        .unwrap_or_else(|| "-".to_string());
    grid.text(px, 5, &format!("hover: {}", hover_name), theme.dim, theme.bg);

    let bottom_y = top_h;
    let bottom_h = h.saturating_sub(top_h);
    grid.frame(hud_x, bottom_y, hud_w, bottom_h, theme.edge, theme.bg);
    grid.text(px, bottom_y as i32 + 1, "speed", theme.fg, theme.bg);
    for (i, p) in scene.planets.iter().enumerate() {
        let y = bottom_y as i32 + 2 + i as i32;
        if y >= h as i32 - 1 {
            break;
        }
        let marker = if i == selected { '▸' } else { ' ' };
        let filled = (clamp01(p.speed / 2.0) * 10.0).round() as usize;
        let bar: String = (0..10).map(|k| if k < filled { '█' } else { '─' }).collect();
        let fg = if i == selected { theme.fg } else { theme.dim };
        grid.text(
            px,
            y,
            &format!("{}{:<8}{} {:+.2}", marker, p.name, bar, p.speed),
            fg,
            theme.bg,
        );
    }
    let mut y = bottom_y as i32 + 11;
    for line in [
        "1-8 select  +/- speed  0 reset",
        "p pause  t theme  q quit",
        "arrows/drag orbit  w/s zoom",
        "r reset view",
    ] {
        if y >= h as i32 - 1 {
            break;
        }
        grid.text(px, y, line, theme.dim, theme.bg);
        y += 1;
    }
}

// -------------------- Main loop --------------------
fn main() -> anyhow::Result<()> {
    let mut out = io::stdout();
    terminal::enable_raw_mode()?;
    execute!(out, EnterAlternateScreen, cursor::Hide, DisableLineWrap, EnableMouseCapture)?;
    let res = run(&mut out);
    execute!(
        out,
        EndSynchronizedUpdate,
        ResetColor,
        DisableMouseCapture,
        cursor::Show,
        EnableLineWrap,
        LeaveAlternateScreen
    )?;
    terminal::disable_raw_mode()?;
    Ok(res?)
}

fn run(out: &mut Stdout) -> io::Result<()> {
    let mut rng = StdRng::seed_from_u64(0x50_1A_21_04);
    let mut scene = Scene::new(&mut rng);
    let mut cam = Camera::new();

    let mut paused = false;
    let mut theme_idx = 0usize;
    let mut selected = 0usize;
    let mut hover: Option<usize> = None;
    let mut mouse: Option<(u16, u16)> = None;
    let mut drag_from: Option<(u16, u16)> = None;

    let mut prev_w: u16 = 0;
    let mut prev_h: u16 = 0;
    let mut prev_buf: Vec<Cell> = Vec::new();
    let mut grid = Grid::new(1, 1, THEMES[theme_idx].bg);

    let frame_dt = Duration::from_millis(1000 / FPS_CAP);

    loop {
        let (w, h) = terminal::size()?;
        let w = w.max(60);
        let h = h.max(20);
        let hud_w = 32u16.min(w / 2);
        let main_w = w - hud_w;
        if w != prev_w || h != prev_h {
            prev_w = w;
            prev_h = h;
            prev_buf = vec![Cell::invalid(); w as usize * h as usize];
            grid = Grid::new(w, h, THEMES[theme_idx].bg);
            execute!(out, terminal::Clear(ClearType::All))?;
        }
        let aspect = (main_w as f32 * ASPECT_X) / h as f32;

        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind == KeyEventKind::Press => match k.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                    KeyCode::Char('p') | KeyCode::Char('P') => paused = !paused,
                    KeyCode::Char('t') | KeyCode::Char('T') => theme_idx = (theme_idx + 1) % THEMES.len(),
                    KeyCode::Char('r') | KeyCode::Char('R') => cam = Camera::new(),
                    KeyCode::Char(c @ '1'..='8') => selected = c as usize - '1' as usize,
                    KeyCode::Char('+') | KeyCode::Char('=') => scene.planets[selected].speed += SPEED_STEP,
                    KeyCode::Char('-') | KeyCode::Char('_') => scene.planets[selected].speed -= SPEED_STEP,
                    KeyCode::Char('0') => scene.planets[selected].speed = 1.0,
                    KeyCode::Left => cam.orbit(-0.08, 0.0),
                    KeyCode::Right => cam.orbit(0.08, 0.0),
                    KeyCode::Up => cam.orbit(0.0, 0.06),
                    KeyCode::Down => cam.orbit(0.0, -0.06),
                    KeyCode::Char('w') | KeyCode::Char('W') => cam.zoom_by(1.0 / 1.08),
                    KeyCode::Char('s') | KeyCode::Char('S') => cam.zoom_by(1.08),
                    _ => {}
                },
                Event::Mouse(m) => match m.kind {
                    MouseEventKind::Moved => {
                        mouse = Some((m.column, m.row));
                        hover = if m.column < main_w {
                            let (nx, ny) = cell_to_ndc(m.column, m.row, main_w, h);
                            pick(&scene, cam, nx, ny, aspect).map(|hit| hit.index)
                        } else {
                            None
                        };
                    }
                    MouseEventKind::Down(MouseButton::Left) => {
                        drag_from = Some((m.column, m.row));
                    }
                    MouseEventKind::Drag(MouseButton::Left) => {
                        if let Some((lx, ly)) = drag_from {
                            let dx = m.column as f32 - lx as f32;
                            let dy = m.row as f32 - ly as f32;
                            cam.orbit(dx * 0.02, dy * 0.04);
                        }
                        drag_from = Some((m.column, m.row));
                        mouse = Some((m.column, m.row));
                        hover = if m.column < main_w {
                            let (nx, ny) = cell_to_ndc(m.column, m.row, main_w, h);
                            pick(&scene, cam, nx, ny, aspect).map(|hit| hit.index)
                        } else {
                            None
                        };
                    }
                    MouseEventKind::Up(MouseButton::Left) => drag_from = None,
                    MouseEventKind::ScrollUp => cam.zoom_by(1.0 / 1.12),
                    MouseEventKind::ScrollDown => cam.zoom_by(1.12),
                    _ => {}
                },
                _ => {}
            }
        }

        let frame_start = Instant::now();

        // Pause skips the step entirely; angles resume exactly where they
        // stopped.
        if !paused {
            advance(&mut scene);
        }

        let theme = THEMES[theme_idx];
        grid.clear(theme.bg);
        render_scene(&mut grid, &theme, &scene, cam, main_w, h);
        render_hud(&mut grid, &theme, &scene, cam, main_w, hud_w, h, paused, selected, hover);
        render_label(&mut grid, &theme, &scene, hover, mouse);

        execute!(out, BeginSynchronizedUpdate)?;
        grid.flush_diff(out, &mut prev_buf)?;
        execute!(out, EndSynchronizedUpdate)?;
        out.flush()?;

        let elapsed = frame_start.elapsed();
        if elapsed < frame_dt {
            std::thread::sleep(frame_dt - elapsed);
        }
    }
}

// -------------------- Tests --------------------
#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn still_scene() -> Scene {
        let mut rng = StdRng::seed_from_u64(7);
        let mut scene = Scene::new(&mut rng);
        for p in &mut scene.planets {
            p.angle = 0.0;
        }
        scene
    }

    fn front_camera() -> Camera {
        Camera { yaw: 0.0, pitch: 0.0, dist: 50.0, fov_y: deg(75.0) }
    }

    fn planet_mut<'a>(scene: &'a mut Scene, name: &str) -> &'a mut Planet {
        scene.planets.iter_mut().find(|p| p.name == name).unwrap()
    }

    #[test]
    fn orbit_radius_invariant_under_updates() {
        let mut scene = still_scene();
        for _ in 0..500 {
            advance(&mut scene);
        }
        for p in &scene.planets {
            assert!(
                (p.position().len() - p.distance).abs() < 1e-3,
                "{} drifted off its orbit",
                p.name
            );
        }
    }

    #[test]
    fn zero_speed_freezes_angle() {
        let mut scene = still_scene();
        let start = planet_mut(&mut scene, "mars").angle;
        planet_mut(&mut scene, "mars").speed = 0.0;
        for _ in 0..200 {
            advance(&mut scene);
        }
        let end = scene.planets.iter().find(|p| p.name == "mars").unwrap().angle;
        assert_eq!(start, end);
    }

    #[test]
    fn angle_delta_is_linear_in_speed() {
        let mut slow = still_scene();
        let mut fast = still_scene();
        planet_mut(&mut slow, "earth").speed = 0.5;
        planet_mut(&mut fast, "earth").speed = 2.0;
        for _ in 0..40 {
            advance(&mut slow);
            advance(&mut fast);
        }
        let d_slow = slow.planets.iter().find(|p| p.name == "earth").unwrap().angle;
        let d_fast = fast.planets.iter().find(|p| p.name == "earth").unwrap().angle;
        assert!((d_fast - 4.0 * d_slow).abs() < EPS);
    }

    #[test]
    fn negative_speed_reverses_direction() {
        let mut scene = still_scene();
        planet_mut(&mut scene, "venus").speed = -1.0;
        for _ in 0..10 {
            advance(&mut scene);
        }
        let angle = scene.planets.iter().find(|p| p.name == "venus").unwrap().angle;
        assert!(angle < 0.0);
    }

    #[test]
    fn mercury_gains_one_radian_over_hundred_steps() {
        let mut scene = still_scene();
        planet_mut(&mut scene, "mercury").speed = 1.0;
        for _ in 0..100 {
            advance(&mut scene);
        }
        let angle = scene.planets.iter().find(|p| p.name == "mercury").unwrap().angle;
        assert!((angle - 1.0).abs() < EPS);
    }

    #[test]
    fn pause_is_identical_to_never_scheduling_the_frames() {
        // 30 active frames, uninterrupted
        let mut straight = still_scene();
        for _ in 0..30 {
            advance(&mut straight);
        }
        // 50 frames, paused for frames 10..30: the step is gated exactly as
        // the run loop gates it, so only 30 frames actually advance
        let mut gated = still_scene();
        for frame in 0..50 {
            let paused = (10..30).contains(&frame);
            if !paused {
                advance(&mut gated);
            }
        }
        for (a, b) in straight.planets.iter().zip(gated.planets.iter()) {
            assert_eq!(a.angle, b.angle, "{} caught up or drifted across the pause", a.name);
        }
    }

    #[test]
    fn spin_phases_advance_independently_of_orbit() {
        let mut scene = still_scene();
        planet_mut(&mut scene, "jupiter").speed = 0.0;
        for _ in 0..10 {
            advance(&mut scene);
        }
        let jupiter = scene.planets.iter().find(|p| p.name == "jupiter").unwrap();
        assert_eq!(jupiter.angle, 0.0);
        assert!((jupiter.spin - 10.0 * PLANET_SPIN_RATE).abs() < EPS);
        assert!((scene.sun.spin - 10.0 * SUN_SPIN_RATE).abs() < EPS);
    }

    #[test]
    fn ndc_mapping_is_centered_and_y_flipped() {
        let (x, y) = cell_to_ndc(49, 24, 100, 50);
        assert!(x.abs() < 0.03 && y.abs() < 0.03);
        let (left, top) = cell_to_ndc(0, 0, 100, 50);
        assert!(left < -0.9, "left edge should map below -0.9, got {left}");
        assert!(top > 0.9, "top row should map above 0.9, got {top}");
        let (_, bottom) = cell_to_ndc(0, 49, 100, 50);
        assert!(bottom < -0.9);
    }

    #[test]
    fn ndc_and_cell_mappings_invert() {
        let (nx, ny) = cell_to_ndc(17, 5, 120, 40);
        let (cx, cy) = ndc_to_cell(nx, ny, 120, 40);
        assert!((cx - 17.5).abs() < 1e-3);
        assert!((cy - 5.5).abs() < 1e-3);
    }

    #[test]
    fn ray_sphere_hits_and_misses() {
        let ray = Ray { origin: Vec3::new(0.0, 0.0, 0.0), dir: Vec3::new(0.0, 0.0, -1.0) };
        let t = ray_sphere(ray, Vec3::new(0.0, 0.0, -10.0), 2.0).unwrap();
        assert!((t - 8.0).abs() < EPS);
        assert!(ray_sphere(ray, Vec3::new(0.0, 0.0, 10.0), 2.0).is_none());
        assert!(ray_sphere(ray, Vec3::new(5.0, 0.0, -10.0), 1.0).is_none());
    }

    #[test]
    fn ray_sphere_from_inside_returns_exit() {
        let ray = Ray { origin: Vec3::new(0.0, 0.0, 0.0), dir: Vec3::new(0.0, 0.0, -1.0) };
        let t = ray_sphere(ray, Vec3::new(0.0, 0.0, 0.0), 3.0).unwrap();
        assert!((t - 3.0).abs() < EPS);
    }

    #[test]
    fn pick_returns_the_single_intersected_planet() {
        let mut scene = still_scene();
        // mercury straight down the view axis, everything else off to the side
        planet_mut(&mut scene, "mercury").angle = PI / 2.0;
        let cam = front_camera();
        let hit = pick(&scene, cam, 0.0, 0.0, 1.4).unwrap();
        assert_eq!(scene.planets[hit.index].name, "mercury");
    }

    #[test]
    fn pick_misses_when_no_planet_is_on_the_ray() {
        let scene = still_scene();
        let cam = front_camera();
        assert!(pick(&scene, cam, 0.0, 0.0, 1.4).is_none());
    }

    #[test]
    fn pick_prefers_the_nearest_hit_along_the_ray() {
        let mut scene = still_scene();
        // both centered on the view axis; venus sits closer to the camera
        planet_mut(&mut scene, "mercury").angle = PI / 2.0;
        planet_mut(&mut scene, "venus").angle = PI / 2.0;
        let cam = front_camera();
        let hit = pick(&scene, cam, 0.0, 0.0, 1.4).unwrap();
        assert_eq!(scene.planets[hit.index].name, "venus");
    }

    #[test]
    fn projecting_a_planet_and_picking_through_it_round_trips() {
        let scene = still_scene();
        let cam = Camera { yaw: 0.4, pitch: 0.5, dist: 50.0, fov_y: deg(75.0) };
        let aspect = 1.6;
        let earth = scene.planets.iter().find(|p| p.name == "earth").unwrap();
        let (nx, ny, _) = cam.to_ndc(earth.position(), aspect).unwrap();
        let hit = pick(&scene, cam, nx, ny, aspect).unwrap();
        assert_eq!(scene.planets[hit.index].name, "earth");
    }

    #[test]
    fn camera_ray_through_center_points_at_origin() {
        let cam = front_camera();
        let ray = cam.ray_through(0.0, 0.0, 1.4);
        assert!((ray.origin.z - 50.0).abs() < EPS);
        // the center ray passes through the origin
        let t = ray.origin.len();
        let at = ray.origin.add(ray.dir.scale(t));
        assert!(at.len() < 1e-3);
    }

    #[test]
    fn camera_zoom_clamps_to_limits() {
        let mut cam = Camera::new();
        for _ in 0..100 {
            cam.zoom_by(0.5);
        }
        assert!((cam.dist - MIN_DIST).abs() < EPS);
        for _ in 0..100 {
            cam.zoom_by(2.0);
        }
        assert!((cam.dist - MAX_DIST).abs() < EPS);
    }

    #[test]
    fn camera_pitch_clamps() {
        let mut cam = Camera::new();
        for _ in 0..200 {
            cam.orbit(0.0, 0.5);
        }
        assert!((cam.pitch - MAX_PITCH).abs() < EPS);
    }

    #[test]
    fn initial_angles_land_in_the_full_turn() {
        let mut rng = StdRng::seed_from_u64(42);
        let scene = Scene::new(&mut rng);
        assert_eq!(scene.planets.len(), 8);
        for p in &scene.planets {
            assert!(p.angle >= 0.0 && p.angle < TAU);
            assert_eq!(p.speed, 1.0);
        }
    }

    #[test]
    fn ring_radii_match_planet_distances() {
        let mut rng = StdRng::seed_from_u64(42);
        let scene = Scene::new(&mut rng);
        for (ring, p) in scene.rings.iter().zip(scene.planets.iter()) {
            assert_eq!(ring.radius, p.distance);
        }
    }

    #[test]
    fn rebuilt_diff_buffer_marks_every_cell_dirty() {
        // after a resize the previous-frame buffer must never match the
        // cleared grid, or the flush emits nothing and the screen keeps
        // whatever the terminal clear left behind
        let theme = THEMES[1];
        let mut grid = Grid::new(10, 4, theme.bg);
        grid.clear(theme.bg);
        let prev = vec![Cell::invalid(); 10 * 4];
        let dirty = grid.cells.iter().zip(prev.iter()).filter(|(a, b)| a != b).count();
        assert_eq!(dirty, 10 * 4);
    }

    #[test]
    fn hover_label_is_drawn_over_the_hud_panel() {
        let mut rng = StdRng::seed_from_u64(3);
        let scene = Scene::new(&mut rng);
        let theme = THEMES[0];
        let (w, h) = (80u16, 24u16);
        let hud_w = 32u16.min(w / 2);
        let main_w = w - hud_w;
        let cam = Camera::new();

        let mut grid = Grid::new(w, h, theme.bg);
        render_scene(&mut grid, &theme, &scene, cam, main_w, h);
        render_hud(&mut grid, &theme, &scene, cam, main_w, hud_w, h, false, 0, Some(0));
        // pointer near the viewport's right edge: " Mercury " spills into
        // the panel and must survive the HUD pass
        render_label(&mut grid, &theme, &scene, Some(0), Some((main_w - 3, 5)));

        let cell = grid.get(main_w as i32 + 1, 6).unwrap();
        assert_eq!(cell.ch, 'e');
        assert_eq!(cell.bg, theme.label_bg);
    }

    #[test]
    fn display_names_are_capitalized() {
        assert_eq!(display_name("mercury"), "Mercury");
        assert_eq!(display_name("neptune"), "Neptune");
        assert_eq!(display_name(""), "");
    }
}
