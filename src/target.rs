#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Position and size of a capture region in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub position: Point,
    pub size: Size,
}

impl Geometry {
    pub fn new(position: Point, size: Size) -> Self {
        Self { position, size }
    }

    /// Build from the edges of a rectangle, as Win32 reports them.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            position: Point::new(left, top),
            size: Size::new(right - left, bottom - top),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Monitor,

    /// `border` is the offset of the client area inside the outer window
    /// rectangle. Only the client area is captured.
    Window { border: Point },
}

/// A monitor or a window designated for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub kind: TargetKind,

    /// `HMONITOR` or `HWND`, kept opaque.
    pub handle: isize,

    /// Enumeration index.
    pub index: usize,

    /// GDI device name for monitors, title for windows.
    pub name: String,

    pub position: Point,
    pub size: Size,
}

impl CaptureTarget {
    pub fn monitor(handle: isize, index: usize, name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            kind: TargetKind::Monitor,
            handle,
            index,
            name: name.into(),
            position: geometry.position,
            size: geometry.size,
        }
    }

    pub fn window(
        handle: isize,
        index: usize,
        name: impl Into<String>,
        geometry: Geometry,
        border: Point,
    ) -> Self {
        Self {
            kind: TargetKind::Window { border },
            handle,
            index,
            name: name.into(),
            position: geometry.position,
            size: geometry.size,
        }
    }

    pub fn is_monitor(&self) -> bool {
        matches!(self.kind, TargetKind::Monitor)
    }

    pub fn is_window(&self) -> bool {
        matches!(self.kind, TargetKind::Window { .. })
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.position, self.size)
    }

    /// Same monitor or window, regardless of where it currently is.
    pub fn same_identity(&self, other: &CaptureTarget) -> bool {
        self.is_monitor() == other.is_monitor()
            && self.handle == other.handle
            && self.index == other.index
    }

    /// A copy of this target carrying freshly measured geometry.
    pub fn with_geometry(&self, geometry: Geometry) -> Self {
        Self {
            position: geometry.position,
            size: geometry.size,
            ..self.clone()
        }
    }
}
