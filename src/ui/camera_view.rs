use super::{
    ActiveTheme, AnyElement, AppView, Context, IntoElement, ParentElement, Styled, StyledExt, div,
    v_flex,
};

impl AppView {
    /// Blocking screen shown when the camera cannot be used. Nothing else is
    /// reachable from here.
    pub(super) fn render_unavailable(&self, message: &str, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let card = v_flex()
            .gap_2()
            .p_4()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                div()
                    .text_sm()
                    .text_color(theme.accent)
                    .font_semibold()
                    .child("⚠ Camera unavailable"),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(theme.muted_foreground)
                    .child("Check that a camera is connected and that this app may use it, then restart."),
            )
            .child(div().text_color(theme.foreground).child(message.to_string()));

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(card)
            .into_any_element()
    }
}
