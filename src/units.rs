use crate::template::{BlankPage, PageOrientation};

/// The side lengths of an ISO 216 A4 page in millimeters. Templates which do not
/// declare a page of their own are laid out on this page.
pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;

/// Converts from millimeters to points, which are defined as 1/72th of an inch.
pub fn millimeters_to_points(millimeters: f32) -> f32 {
    millimeters * 2.834646
}

/// The size of one output page in points. Layout works in points with the origin
/// at the top-left corner of the page and the vertical axis growing downwards;
/// `flip_y` maps such a coordinate onto the bottom-left origin of PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    /// Derives the geometry of a blank page from its declaration in the template.
    /// A landscape orientation swaps the declared side lengths.
    pub fn from_blank_page(blank_page: &BlankPage) -> PageGeometry {
        let (width, height) = match blank_page.orientation {
            PageOrientation::Portrait => (blank_page.width, blank_page.height),
            PageOrientation::Landscape => (blank_page.height, blank_page.width),
        };
        PageGeometry {
            width: millimeters_to_points(width),
            height: millimeters_to_points(height),
        }
    }

    /// Derives the geometry from the `MediaBox` of an existing PDF page.
    pub fn from_media_box(media_box: [f32; 4]) -> PageGeometry {
        PageGeometry {
            width: media_box[2] - media_box[0],
            height: media_box[3] - media_box[1],
        }
    }

    pub fn flip_y(&self, y_from_top: f32) -> f32 {
        self.height - y_from_top
    }
}
