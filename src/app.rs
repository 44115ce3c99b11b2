use gtk4::gdk::Key;
use gtk4::prelude::*;
use gtk4::{
    glib, Application, ApplicationWindow, Box as GtkBox, Entry, EventControllerKey, Label,
    Orientation,
};
use tracing::error;

use imgpeek::ui::{self, GtkHost};
use imgpeek::{PreviewConfig, Previewer};

const APP_ID: &str = "com.imgpeek.Demo";

pub struct ImgpeekApp {
    app: Application,
}

impl ImgpeekApp {
    pub fn new(initial_url: Option<String>) -> Self {
        let app = Application::builder().application_id(APP_ID).build();

        app.connect_activate(move |app| Self::on_activate(app, initial_url.as_deref()));

        Self { app }
    }

    pub fn run(&self) -> i32 {
        // The URL argument is handled by us, not by GApplication.
        let argv0: Vec<String> = std::env::args().take(1).collect();
        self.app.run_with_args(&argv0).into()
    }

    fn on_activate(app: &Application, initial_url: Option<&str>) {
        let window = ApplicationWindow::builder()
            .application(app)
            .title("imgpeek")
            .default_width(1000)
            .default_height(800)
            .build();

        let content = GtkBox::new(Orientation::Vertical, 8);
        content.set_margin_top(12);
        content.set_margin_bottom(12);
        content.set_margin_start(12);
        content.set_margin_end(12);

        let hint = Label::new(Some(
            "Enter a .png or .jpg URL and press Enter. Move the pointer over the preview to dismiss it, or press Escape.",
        ));
        hint.set_wrap(true);
        let entry = Entry::new();
        entry.set_placeholder_text(Some("https://example.com/picture.png"));
        content.append(&hint);
        content.append(&entry);
        window.set_child(Some(&content));

        let previewer = match Previewer::with_defaults(GtkHost::new(&entry), PreviewConfig::from_env())
        {
            Ok(previewer) => previewer,
            Err(e) => {
                error!(error = %e, "Failed to set up HTTP client");
                return;
            }
        };
        ui::attach(&previewer);

        let previewer_clone = previewer.clone();
        entry.connect_activate(move |entry| {
            previewer_clone.start(entry.text().trim());
        });

        let key_controller = EventControllerKey::new();
        let previewer_clone = previewer.clone();
        key_controller.connect_key_pressed(move |_, key, _code, _state| {
            if key == Key::Escape {
                previewer_clone.end();
                glib::Propagation::Stop
            } else {
                glib::Propagation::Proceed
            }
        });
        window.add_controller(key_controller);

        window.present();

        if let Some(url) = initial_url {
            entry.set_text(url);
            previewer.start(url);
        }
    }
}
