// GTK4 preview popup
// Borderless, non-focusable window transient for the host, showing the decoder bitmap

use gdk4::{MemoryFormat, MemoryTexture, Texture};
use gtk4::prelude::*;
use gtk4::{glib, EventControllerMotion, Picture, Widget, Window};
use tracing::trace;

use crate::decoder::{Bitmap, Region};
use crate::preview::{Host, MotionHandler, Popup};

/// Fallback host size while the toplevel has no allocation yet.
const FALLBACK_HOST_SIZE: (i32, i32) = (1200, 800);

/// A widget that hosts previews, typically the text view the URLs live in.
pub struct GtkHost {
    widget: Widget,
}

impl GtkHost {
    pub fn new(widget: &impl IsA<Widget>) -> Self {
        Self {
            widget: widget.clone().upcast(),
        }
    }

    fn toplevel(&self) -> Option<Window> {
        self.widget.root().and_downcast::<Window>()
    }
}

impl Host for GtkHost {
    type Popup = GtkPopup;

    fn host_size(&self) -> (i32, i32) {
        let Some(window) = self.toplevel() else {
            return FALLBACK_HOST_SIZE;
        };
        let (w, h) = (window.width(), window.height());
        if w > 0 && h > 0 {
            return (w, h);
        }
        let (w, h) = window.default_size();
        if w > 0 && h > 0 {
            (w, h)
        } else {
            FALLBACK_HOST_SIZE
        }
    }

    fn create_popup(&self, bitmap: &Bitmap, on_motion: MotionHandler) -> GtkPopup {
        let picture = Picture::new();
        picture.set_paintable(Some(&bitmap_texture(bitmap)));
        picture.set_can_shrink(false);

        // Keep-above, pager/taskbar hints and placement are left to the
        // compositor in GTK4; a transient window is centered on its parent.
        let window = Window::builder()
            .decorated(false)
            .deletable(false)
            .resizable(false)
            .focusable(false)
            .can_focus(false)
            .build();
        if let Some(parent) = self.toplevel() {
            window.set_transient_for(Some(&parent));
        }
        window.set_child(Some(&picture));

        let motion_controller = EventControllerMotion::new();
        motion_controller.connect_motion(move |_, x, y| on_motion(x, y));
        window.add_controller(motion_controller);

        window.present();

        GtkPopup {
            window,
            picture,
            bitmap: bitmap.clone(),
        }
    }
}

pub struct GtkPopup {
    window: Window,
    picture: Picture,
    bitmap: Bitmap,
}

impl Popup for GtkPopup {
    fn invalidate(&self, region: Region) {
        // GtkPicture has no partial damage; re-upload and let GTK diff.
        trace!(?region, "Repainting preview");
        self.picture.set_paintable(Some(&bitmap_texture(&self.bitmap)));
    }

    fn destroy(&self) {
        self.window.destroy();
    }
}

fn bitmap_texture(bitmap: &Bitmap) -> Texture {
    let image = bitmap.read();
    let (width, height) = image.dimensions();
    let bytes = glib::Bytes::from_owned(image.as_raw().clone());
    MemoryTexture::new(
        width as i32,
        height as i32,
        MemoryFormat::R8g8b8a8,
        &bytes,
        (width * 4) as usize,
    )
    .upcast()
}
