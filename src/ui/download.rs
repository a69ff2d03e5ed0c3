use super::{
    ActiveTheme, AnyElement, AppView, Context, DownloadState, IntoElement, ModelDownloadEvent,
    ParentElement, Styled, StyledExt, Tag, div, h_flex, v_flex,
};

impl DownloadState {
    pub(super) fn apply(&mut self, event: ModelDownloadEvent) {
        match event {
            ModelDownloadEvent::AlreadyPresent { model } => {
                self.model = Some(model);
                self.message = format!("Found {} model", model.label());
            }
            ModelDownloadEvent::Started { model, total } => {
                self.model = Some(model);
                self.downloaded = 0;
                self.total = total;
                self.message = format!("Downloading {} model...", model.label());
            }
            ModelDownloadEvent::Progress {
                model,
                downloaded,
                total,
            } => {
                self.model = Some(model);
                self.downloaded = downloaded;
                self.total = total;
            }
            ModelDownloadEvent::Finished { model } => {
                self.message = format!("{} model ready, loading...", model.label());
            }
        }
    }
}

impl AppView {
    pub(super) fn render_download_view(
        &self,
        state: &DownloadState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let bar = progress_bar_string(state.downloaded, state.total);
        let detail = match state.total {
            Some(total) if total > 0 => {
                let percent = (state.downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                format!("{percent:.1}%")
            }
            _ => format!("Downloaded {} KB", state.downloaded / 1024),
        };
        let title = state
            .model
            .map(|model| format!("⟳ Preparing {} model", model.label()))
            .unwrap_or_else(|| "⟳ Preparing models".to_string());

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_color(theme.foreground)
                            .font_semibold()
                            .child(title),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child(self.camera_label.clone()),
                    ),
            )
            .child(
                div()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.muted)
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(bar),
            )
            .child(
                div()
                    .text_sm()
                    .text_color(theme.muted_foreground)
                    .child(detail),
            )
            .child(
                div()
                    .text_color(theme.foreground)
                    .child(state.message.clone()),
            );

        for (model, reason) in &self.unavailable_models {
            container = container.child(
                Tag::warning()
                    .rounded_full()
                    .child(format!("{} model disabled: {reason}", model.label())),
            );
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    const BAR_LEN: usize = 30;
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            let empty = BAR_LEN.saturating_sub(filled);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(empty),
                pct * 100.0
            )
        }
        _ => {
            let spinner_width = ((downloaded / 64) as usize % BAR_LEN) + 1;
            format!(
                "[{:-<width$}] unknown size",
                ">",
                width = spinner_width.min(BAR_LEN)
            )
        }
    }
}
