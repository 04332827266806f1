use crate::document::{BodyContent, Document, ImageSource, LogoSlot, PhotoSlot, TextSlot};

fn logo_label(slot: &LogoSlot) -> String {
    match &slot.source {
        ImageSource::Inline(image) => format!("{} ({})", slot.label, image.mime_type()),
        ImageSource::Builtin(logo) => format!("{} (default {:?})", slot.label, logo),
    }
}

fn slot_text(slot: &TextSlot) -> String {
    if slot.placeholder {
        format!("[{}]", slot.text)
    } else {
        slot.text.clone()
    }
}

impl Document {
    /// Plain-text outline of the page, band by band. Placeholders are shown in brackets.
    ///
    /// # Example
    /// ```
    /// use jobdesc::document::Document;
    /// use jobdesc::model::UnitRecord;
    ///
    /// let outline = Document::from_unit(&UnitRecord::default()).outline();
    /// assert!(outline.contains("[RANK & FULL NAME]"));
    /// ```
    pub fn outline(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("== {} job description ==\n", self.variant));

        out.push_str("Header\n");
        let left: Vec<String> = self.header.left_logos.iter().map(logo_label).collect();
        out.push_str(&format!("  left:  {}\n", left.join(", ")));
        out.push_str(&format!("  right: {}\n", logo_label(&self.header.right_logo)));
        if let Some(title) = &self.header.title {
            out.push_str(&format!("  title: {}\n", title));
        }
        if let Some(address) = &self.header.address {
            out.push_str(&format!("  address: {}\n", address));
        }

        out.push_str("Banner\n");
        let photo = match &self.banner.photo {
            PhotoSlot::Image(image) => format!("photo ({})", image.mime_type()),
            PhotoSlot::Silhouette => "[silhouette]".to_string(),
        };
        out.push_str(&format!("  {}\n", photo));
        out.push_str(&format!("  {}\n", slot_text(&self.banner.rank_name)));
        out.push_str(&format!("  {}\n", slot_text(&self.banner.designation)));

        out.push_str("Body\n");
        out.push_str(&format!("  {}\n", self.body.heading));
        out.push_str(&format!("  {}\n", self.body.subtitle));
        match &self.body.content {
            BodyContent::Text(text) => {
                for line in text.lines() {
                    out.push_str(&format!("  | {}\n", line));
                }
            }
            BodyContent::Placeholder(text) => out.push_str(&format!("  [{}]\n", text)),
        }

        out.push_str("Footer\n");
        out.push_str(&format!("  {}\n", self.footer.tagline));
        out
    }

    /// Pretty JSON of the whole document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
