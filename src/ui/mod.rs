use std::{mem, sync::Arc};

use crossbeam_channel::Receiver;
use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div,
    img, px,
};
use gpui_component::{
    ActiveTheme, Disableable, Root, Selectable, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::AppConfig,
    error::CaptureError,
    model_download::{ModelDownloadEvent, ModelKind},
    pipeline::{
        CameraSource, Command, Notice, NoticeLevel, PipelineEvent, PipelineHandle,
        PipelineSettings, PipelineStatus, RecorderState, open_holistic, start_pipeline,
    },
    types::{Frame, RegionFilter},
};

mod camera_view;
mod download;
mod main_view;
mod render_util;

const VIDEO_MIN_SIZE: (f32, f32) = (320.0, 240.0);
const DEFAULT_CAMERA_RATIO: f32 = 4.0 / 3.0;
const VIDEO_WIDTH: f32 = 800.0;

/// Opens the main window. `camera` is the result of probing the configured
/// camera at startup; when it failed the window only shows the error.
pub fn launch_ui(
    app: &mut App,
    config: AppConfig,
    camera: Result<String, CaptureError>,
) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Holistic Recorder".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|cx| AppView::new(config, camera, cx));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    app.on_window_closed(|app| {
        if app.windows().is_empty() {
            app.quit();
        }
    })
    .detach();

    Ok(())
}

struct AppView {
    screen: Screen,
    pipeline: Option<PipelineHandle>,
    frame_rx: Option<Receiver<Frame>>,
    event_rx: Option<Receiver<PipelineEvent>>,
    camera_label: String,
    output_path: String,
    latest_image: Option<Arc<RenderImage>>,
    latest_size: Option<(u32, u32)>,
    status: Option<PipelineStatus>,
    notice: Option<Notice>,
    unavailable_models: Vec<(ModelKind, String)>,
}

enum Screen {
    /// Nothing can be captured; the pipeline never runs.
    Unavailable { message: String },
    Loading(DownloadState),
    Main,
}

struct DownloadState {
    model: Option<ModelKind>,
    downloaded: u64,
    total: Option<u64>,
    message: String,
}

impl DownloadState {
    fn new() -> Self {
        Self {
            model: None,
            downloaded: 0,
            total: None,
            message: "Preparing landmark models...".to_string(),
        }
    }
}

impl AppView {
    fn new(
        config: AppConfig,
        camera: Result<String, CaptureError>,
        cx: &mut Context<'_, Self>,
    ) -> Self {
        cx.on_release(|this, _| {
            if let Some(pipeline) = this.pipeline.take() {
                pipeline.shutdown();
            }
        })
        .detach();

        let output_path = config.recording.output_path.display().to_string();
        let mut view = Self {
            screen: Screen::Loading(DownloadState::new()),
            pipeline: None,
            frame_rx: None,
            event_rx: None,
            camera_label: String::new(),
            output_path,
            latest_image: None,
            latest_size: None,
            status: None,
            notice: None,
            unavailable_models: Vec::new(),
        };

        match camera {
            Ok(label) => {
                view.camera_label = label;
                view.spawn_pipeline(config);
            }
            Err(err) => {
                log::error!("camera unavailable, recording disabled: {err}");
                view.screen = Screen::Unavailable {
                    message: err.to_string(),
                };
            }
        }

        view
    }

    fn spawn_pipeline(&mut self, config: AppConfig) {
        let settings = PipelineSettings {
            tick_interval: config.capture.tick_interval(),
            region: config.recording.region.clone(),
            output_path: config.recording.output_path.clone(),
        };
        let camera_index = config.capture.camera_index;
        let detector_config = config.detector;

        let started = start_pipeline(
            settings,
            move || CameraSource::open(camera_index),
            move |provisioning| open_holistic(&detector_config, provisioning),
        );

        match started {
            Ok((handle, frame_rx, event_rx)) => {
                self.pipeline = Some(handle);
                self.frame_rx = Some(frame_rx);
                self.event_rx = Some(event_rx);
            }
            Err(err) => {
                log::error!("failed to start pipeline: {err:?}");
                self.screen = Screen::Unavailable {
                    message: format!("Failed to start capture: {err:#}"),
                };
            }
        }
    }

    fn send(&self, command: Command) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.send(command);
        }
    }

    /// Drains pipeline events and moves between screens.
    fn poll_events(&mut self) {
        let Some(event_rx) = self.event_rx.take() else {
            return;
        };

        while let Ok(event) = event_rx.try_recv() {
            match event {
                PipelineEvent::ModelDownload(event) => {
                    if let Screen::Loading(state) = &mut self.screen {
                        state.apply(event);
                    }
                }
                PipelineEvent::ModelUnavailable { model, reason } => {
                    self.unavailable_models.push((model, reason));
                }
                PipelineEvent::Ready(status) => {
                    self.status = Some(status);
                    self.screen = Screen::Main;
                }
                PipelineEvent::Status(status) => {
                    self.status = Some(status);
                }
                PipelineEvent::Notice(notice) => {
                    self.notice = Some(notice);
                }
                PipelineEvent::Unavailable(message) => {
                    self.screen = Screen::Unavailable { message };
                    self.frame_rx = None;
                    if let Some(pipeline) = self.pipeline.take() {
                        pipeline.shutdown();
                    }
                }
            }
        }

        self.event_rx = Some(event_rx);
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.poll_events();

        let screen = mem::replace(&mut self.screen, Screen::Main);
        let view = match &screen {
            Screen::Unavailable { message } => self.render_unavailable(message, cx),
            Screen::Loading(state) => self.render_download_view(state, cx),
            Screen::Main => self.render_main(window, cx),
        };
        self.screen = screen;
        view
    }
}
