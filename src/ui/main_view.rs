use super::render_util::frame_to_image;
use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, Command, Context,
    DEFAULT_CAMERA_RATIO, Disableable, IntoElement, NoticeLevel, ObjectFit, ParentElement,
    RecorderState, RegionFilter, RenderImage, Selectable, SharedString, Styled, StyledImage,
    VIDEO_MIN_SIZE, VIDEO_WIDTH, Tag, Window, div, h_flex, img, px, v_flex,
};
use std::sync::Arc;

impl AppView {
    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let frame_rx = self.frame_rx.take();
        if let Some(rx) = frame_rx.as_ref() {
            if let Some(frame) = rx.try_iter().last() {
                self.latest_size = Some((frame.width, frame.height));
                if let Some(image) = frame_to_image(frame) {
                    self.replace_latest_image(image, window, cx);
                }
            }
        }
        self.frame_rx = frame_rx;

        let video_height = (VIDEO_WIDTH / self.camera_aspect_ratio()).max(VIDEO_MIN_SIZE.1);
        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .rounded_t_lg()
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .rounded_t_lg()
                .child("Waiting for camera...")
                .into_any_element()
        };

        let video = div()
            .relative()
            .w(px(VIDEO_WIDTH))
            .h(px(video_height))
            .overflow_hidden()
            .rounded_t_lg()
            .bg(gpui::rgb(0x000000))
            .child(frame_view);

        v_flex()
            .size_full()
            .items_center()
            .gap_3()
            .p_4()
            .bg(gpui::rgb(0x1a2332))
            .child(self.render_region_selector(cx))
            .child(
                v_flex()
                    .w(px(VIDEO_WIDTH.max(VIDEO_MIN_SIZE.0)))
                    .rounded_lg()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x0f1419))
                    .child(video)
                    .child(self.render_controls(cx)),
            )
            .child(self.render_status_line(cx))
            .into_any_element()
    }

    fn render_region_selector(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let current = self.status.map(|status| status.region);
        let mut row = h_flex().gap_2().items_center().child(
            div()
                .text_sm()
                .text_color(gpui::rgb(0xa0aab8))
                .child("Body part"),
        );

        for filter in RegionFilter::ALL {
            let label = filter.label();
            row = row.child(
                Button::new(SharedString::from(format!("region-{label}")))
                    .outline()
                    .label(label)
                    .selected(current == Some(filter))
                    .on_click(cx.listener(move |this, _, _, cx| {
                        this.send(Command::SelectRegion(label.to_string()));
                        cx.notify();
                    })),
            );
        }

        row.into_any_element()
    }

    fn render_controls(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let (can_start, can_stop, can_save) = self
            .status
            .map(|s| (s.recorder.can_start, s.recorder.can_stop, s.recorder.can_save))
            .unwrap_or((false, false, false));

        h_flex()
            .gap_2()
            .p_3()
            .justify_center()
            .child(
                Button::new(SharedString::from("start"))
                    .primary()
                    .label("Start")
                    .disabled(!can_start)
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.send(Command::Start);
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("stop"))
                    .outline()
                    .label("Stop")
                    .disabled(!can_stop)
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.send(Command::Stop);
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("save"))
                    .outline()
                    .label("Save")
                    .disabled(!can_save)
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.send(Command::Save);
                        cx.notify();
                    })),
            )
            .into_any_element()
    }

    fn render_status_line(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();

        let (recording_text, recording_color): (String, gpui::Hsla) = match self.status {
            Some(status) if status.recorder.state == RecorderState::Recording => (
                format!("● Recording, {} frames", status.recorder.recorded),
                gpui::rgb(0xf87171).into(),
            ),
            Some(status) => (
                format!("○ Idle, {} frames buffered", status.recorder.recorded),
                theme.muted_foreground,
            ),
            None => ("○ Starting...".to_string(), theme.muted_foreground),
        };

        let mut row = h_flex()
            .w(px(VIDEO_WIDTH))
            .gap_3()
            .items_center()
            .child(
                div()
                    .text_xs()
                    .text_color(recording_color)
                    .child(recording_text),
            );

        if let Some(notice) = &self.notice {
            let tag = match notice.level {
                NoticeLevel::Info => Tag::success(),
                NoticeLevel::Warning => Tag::warning(),
                NoticeLevel::Error => Tag::danger(),
            };
            row = row.child(tag.rounded_full().child(notice.message.clone()));
        }

        for (model, _) in &self.unavailable_models {
            row = row.child(
                Tag::warning()
                    .rounded_full()
                    .child(format!("{} disabled", model.label())),
            );
        }

        row = row.child(div().flex_1()).child(
            div()
                .text_xs()
                .text_color(theme.muted_foreground)
                .overflow_hidden()
                .text_ellipsis()
                .whitespace_nowrap()
                .child(format!("{} → {}", self.camera_label, self.output_path)),
        );

        row.into_any_element()
    }

    fn camera_aspect_ratio(&self) -> f32 {
        match self.latest_size {
            Some((width, height)) if height > 0 => width as f32 / height as f32,
            _ => DEFAULT_CAMERA_RATIO,
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // The sprite atlas keeps every frame unless the old texture is dropped.
            cx.drop_image(old_image, Some(window));
        }
    }
}
