slint::include_modules!();

use anyhow::Result;
use log::info;
use rssiview_core::pipeline::{gauge_position, GAUGE_TICKS};
use rssiview_core::{Indicator, Presenter, SerialReader, Settings, BAUD_RATES};
use std::cell::RefCell;
use std::rc::Rc;

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app = MainWindow::new()?;

    let presenter = Rc::new(RefCell::new(Presenter::default()));
    let settings = Rc::new(RefCell::new(Settings::load_or_default()));

    // Initial state
    {
        let settings = settings.borrow();
        app.set_show_timestamp(settings.show_timestamp);
        app.set_selected_baud(settings.baud_rate().to_string().into());
        let bauds: Vec<slint::SharedString> = BAUD_RATES.iter().map(|b| b.to_string().into()).collect();
        app.set_baud_list(Rc::new(slint::VecModel::from(bauds)).into());
        let ticks: Vec<Tick> = GAUGE_TICKS
            .iter()
            .map(|&(dbm, distance)| Tick {
                label: format!("{distance} ({dbm} dBm)").into(),
                position: gauge_position(dbm) as f32,
            })
            .collect();
        app.set_ticks(Rc::new(slint::VecModel::from(ticks)).into());
        refresh_ports(&app, &settings.port_name);
    }

    // Connect button
    {
        let app_weak = app.as_weak();
        let presenter = presenter.clone();
        let settings = settings.clone();

        app.on_connect_clicked(move || {
            let Some(app) = app_weak.upgrade() else { return };
            let port_display = app.get_selected_port().to_string();
            let Some(port_name) = port_display.split_whitespace().next() else {
                return;
            };

            let mut settings = settings.borrow_mut();
            let baud_rate = app.get_selected_baud().parse().unwrap_or_else(|_| settings.baud_rate());
            let config = settings.serial_config(port_name, baud_rate);

            presenter.borrow_mut().connect(config);
            app.set_is_connected(true);

            settings.port_name = port_name.to_string();
            settings.baud_rate = baud_rate;
            settings.store();

            update_log_display(&app, &presenter.borrow());
        });
    }

    // Disconnect button
    {
        let app_weak = app.as_weak();
        let presenter = presenter.clone();

        app.on_disconnect_clicked(move || {
            let Some(app) = app_weak.upgrade() else { return };
            presenter.borrow_mut().disconnect();
            app.set_is_connected(false);
            update_log_display(&app, &presenter.borrow());
        });
    }

    // Save button
    {
        let app_weak = app.as_weak();
        let presenter = presenter.clone();

        app.on_save_clicked(move || {
            let Some(app) = app_weak.upgrade() else { return };
            let ready = presenter.borrow_mut().ready_to_save();
            // No borrow may be held here: the poll timer can fire inside the
            // dialog's modal loop.
            let path = if ready {
                rfd::FileDialog::new()
                    .set_title("Save JSON Data")
                    .add_filter("JSON Files", &["json"])
                    .set_file_name("rssi.json")
                    .save_file()
            } else {
                None
            };
            if let Some(path) = path {
                // Failures are already in the event log; the records stay for a retry.
                let _ = presenter.borrow_mut().save(&path);
            }
            update_log_display(&app, &presenter.borrow());
        });
    }

    // Clear button
    {
        let app_weak = app.as_weak();
        let presenter = presenter.clone();

        app.on_clear_clicked(move || {
            let Some(app) = app_weak.upgrade() else { return };
            presenter.borrow_mut().clear_log();
            update_log_display(&app, &presenter.borrow());
        });
    }

    // Refresh ports button
    {
        let app_weak = app.as_weak();
        app.on_refresh_ports_clicked(move || {
            let Some(app) = app_weak.upgrade() else { return };
            let current = app.get_selected_port().to_string();
            refresh_ports(&app, &current);
        });
    }

    // Display options changed
    {
        let app_weak = app.as_weak();
        let presenter = presenter.clone();
        let settings = settings.clone();
        app.on_display_options_changed(move || {
            let Some(app) = app_weak.upgrade() else { return };
            settings.borrow_mut().show_timestamp = app.get_show_timestamp();
            update_log_display(&app, &presenter.borrow());
        });
    }

    // Window close: join the reader before the port goes away.
    {
        let presenter = presenter.clone();
        let settings = settings.clone();
        app.window().on_close_requested(move || {
            presenter.borrow_mut().shutdown();
            settings.borrow().store();
            slint::CloseRequestResponse::HideWindow
        });
    }

    // Event polling timer. Several readings per tick collapse into one redraw.
    let app_weak = app.as_weak();
    let presenter_clone = presenter.clone();

    let _timer = slint::Timer::default();
    _timer.start(slint::TimerMode::Repeated, std::time::Duration::from_millis(50), move || {
        let Some(app) = app_weak.upgrade() else { return };
        let summary = presenter_clone.borrow_mut().poll();

        if let Some(indicator) = &summary.indicator {
            apply_indicator(&app, indicator);
        }
        if summary.disconnected {
            app.set_is_connected(false);
        }
        if summary.log_changed {
            update_log_display(&app, &presenter_clone.borrow());
        }
    });

    app.run()?;

    presenter.borrow_mut().shutdown();
    info!("bye");
    Ok(())
}

fn refresh_ports(app: &MainWindow, preferred: &str) {
    let ports = SerialReader::list_ports();
    let port_names: Vec<slint::SharedString> = ports.iter().map(|p| p.label().into()).collect();

    let port_list = Rc::new(slint::VecModel::from(port_names.clone()));
    app.set_port_list(port_list.into());

    let wanted = preferred.split_whitespace().next().unwrap_or_default();
    let selected = port_names
        .iter()
        .find(|label| !wanted.is_empty() && label.split_whitespace().next() == Some(wanted))
        .or_else(|| port_names.first());
    if let Some(label) = selected {
        app.set_selected_port(label.clone());
    }
}

fn apply_indicator(app: &MainWindow, indicator: &Indicator) {
    app.set_has_reading(true);
    app.set_indicator_top(indicator.top() as f32);
    app.set_indicator_height(indicator.height as f32);
    app.set_indicator_color(slint::Color::from_rgb_u8(
        indicator.color.r,
        indicator.color.g,
        indicator.color.b,
    ));
    app.set_value_text(indicator.label.clone().into());
}

fn update_log_display(app: &MainWindow, presenter: &Presenter) {
    let text = presenter.log().to_text(app.get_show_timestamp());
    app.set_log_text(text.into());
}
