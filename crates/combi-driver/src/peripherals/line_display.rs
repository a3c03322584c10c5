//! Two-line character display.
//!
//! The display contents live in the connection's
//! [`DeviceMirror`](crate::mirror::DeviceMirror): one character and one attribute per cell,
//! plus the cursor. Every handle edits that shared buffer, so a new handle
//! continues where the last one left off. Both rows are rewritten on every
//! change with one line command per row:
//!
//! ```text
//! T 0 40 Hello world         nnnnnnnnnnnrrrrrrrrr
//! │ │ │  └ 20 characters ──┘ └ 20 attributes ───┘
//! │ │ └ character count
//! │ └ row
//! └ prefix
//! ```

use std::sync::Arc;

use combi_core::{PeripheralKind, constants::*};
use combi_protocol::Command;

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::peripherals::{Peripheral, Session};

/// Brightness below which the display is blanked.
const MIN_VISIBLE_BRIGHTNESS: u8 = 50;

/// Character attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayAttribute {
    #[default]
    Normal,
    Reverse,
    Blink,
    BlinkReverse,
}

impl DisplayAttribute {
    /// Attribute character sent to the device.
    pub fn code(self) -> char {
        match self {
            Self::Normal => 'n',
            Self::Reverse => 'r',
            Self::Blink => 'b',
            Self::BlinkReverse => 'a',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    attribute: DisplayAttribute,
}

const BLANK: Cell = Cell {
    ch: ' ',
    attribute: DisplayAttribute::Normal,
};

const BLANK_ROW: [Cell; DISPLAY_COLUMNS] = [BLANK; DISPLAY_COLUMNS];

/// Characters, attributes and cursor of the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayContents {
    cells: [[Cell; DISPLAY_COLUMNS]; DISPLAY_ROWS],
    cursor: (usize, usize),
}

impl Default for DisplayContents {
    fn default() -> Self {
        Self {
            cells: [BLANK_ROW; DISPLAY_ROWS],
            cursor: (0, 0),
        }
    }
}

impl DisplayContents {
    /// Text of one row, `None` outside the display.
    pub fn row_text(&self, row: usize) -> Option<String> {
        self.cells
            .get(row)
            .map(|cells| cells.iter().map(|c| c.ch).collect())
    }

    /// Attribute characters of one row.
    pub fn row_attributes(&self, row: usize) -> Option<String> {
        self.cells
            .get(row)
            .map(|cells| cells.iter().map(|c| c.attribute.code()).collect())
    }

    /// Cursor as (row, column).
    pub fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    /// Characters followed by attributes, as sent in a line command.
    fn line(&self, row: usize) -> String {
        let cells = &self.cells[row];
        cells
            .iter()
            .map(|c| c.ch)
            .chain(cells.iter().map(|c| c.attribute.code()))
            .collect()
    }

    /// Write `text` from a position and return where it ended.
    fn write(
        &mut self,
        (mut row, mut column): (usize, usize),
        text: &str,
        attribute: DisplayAttribute,
    ) -> (usize, usize) {
        for c in text.chars() {
            self.put(&mut row, &mut column, c, attribute);
        }
        (row, column)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn scroll(&mut self, direction: ScrollDirection, units: usize) {
        let span = match direction {
            ScrollDirection::Up | ScrollDirection::Down => DISPLAY_ROWS,
            ScrollDirection::Left | ScrollDirection::Right => DISPLAY_COLUMNS,
        };
        if units >= span {
            self.clear();
            return;
        }
        match direction {
            ScrollDirection::Up => {
                self.cells.rotate_left(units);
                self.cells[DISPLAY_ROWS - units..].fill(BLANK_ROW);
            }
            ScrollDirection::Down => {
                self.cells.rotate_right(units);
                self.cells[..units].fill(BLANK_ROW);
            }
            ScrollDirection::Left => {
                for row in &mut self.cells {
                    row.rotate_left(units);
                    row[DISPLAY_COLUMNS - units..].fill(BLANK);
                }
            }
            ScrollDirection::Right => {
                for row in &mut self.cells {
                    row.rotate_right(units);
                    row[..units].fill(BLANK);
                }
            }
        }
    }

    fn put(&mut self, row: &mut usize, column: &mut usize, c: char, attribute: DisplayAttribute) {
        if c == '\r' {
            *column = 0;
            return;
        }
        if c == '\n' || *column == DISPLAY_COLUMNS {
            *column = 0;
            if *row + 1 < DISPLAY_ROWS {
                *row += 1;
            } else {
                self.cells.rotate_left(1);
                self.cells[DISPLAY_ROWS - 1] = BLANK_ROW;
            }
            if c == '\n' {
                return;
            }
        }
        self.cells[*row][*column] = Cell { ch: c, attribute };
        *column += 1;
    }
}

#[derive(Debug)]
pub struct LineDisplay {
    session: Session,
    brightness: u8,
    character_set: u32,
}

impl LineDisplay {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::LineDisplay),
            brightness: 100,
            character_set: DISPLAY_CHARACTER_SETS[0],
        }
    }

    /// Current display contents.
    pub fn contents(&self) -> DisplayContents {
        self.session.driver().mirror().display()
    }

    /// Text of one row, `None` outside the display.
    pub fn row_text(&self, row: usize) -> Option<String> {
        self.contents().row_text(row)
    }

    /// Attribute characters of one row.
    pub fn row_attributes(&self, row: usize) -> Option<String> {
        self.contents().row_attributes(row)
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.contents().cursor()
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn character_set(&self) -> u32 {
        self.character_set
    }

    fn edit<R>(&self, edit: impl FnOnce(&mut DisplayContents) -> R) -> R {
        self.session.driver().mirror().edit_display(edit)
    }

    /// Write text at the cursor and advance it.
    ///
    /// `\r` returns to the start of the row, `\n` moves to the next row.
    /// Text running past the last column wraps; writing past the last row
    /// scrolls the display up.
    ///
    /// # Errors
    ///
    /// Fails when not enabled or the device is not online.
    pub async fn display_text(&mut self, text: &str, attribute: DisplayAttribute) -> Result<()> {
        self.session.ensure_enabled()?;
        self.edit(|display| display.cursor = display.write(display.cursor, text, attribute));
        self.refresh().await
    }

    /// Write text starting at a position without moving the cursor.
    ///
    /// # Errors
    ///
    /// Fails for positions outside the display, when not enabled or the
    /// device is not online.
    pub async fn display_text_at(
        &mut self,
        row: usize,
        column: usize,
        text: &str,
        attribute: DisplayAttribute,
    ) -> Result<()> {
        self.session.ensure_enabled()?;
        if row >= DISPLAY_ROWS || column >= DISPLAY_COLUMNS {
            return Err(DriverError::invalid_argument(format!(
                "Position {},{} outside display",
                row, column
            )));
        }
        self.edit(|display| display.write((row, column), text, attribute));
        self.refresh().await
    }

    /// Blank the display and home the cursor.
    ///
    /// # Errors
    ///
    /// Fails when not enabled or the device is not online.
    pub async fn clear_text(&mut self) -> Result<()> {
        self.session.ensure_enabled()?;
        self.edit(DisplayContents::clear);
        self.refresh().await
    }

    /// Scroll the contents. Scrolling by the full height (or width) or more
    /// clears the display; zero units does nothing.
    ///
    /// # Errors
    ///
    /// Fails when not enabled or the device is not online.
    pub async fn scroll_text(&mut self, direction: ScrollDirection, units: usize) -> Result<()> {
        self.session.ensure_enabled()?;
        if units == 0 {
            return Ok(());
        }
        self.edit(|display| display.scroll(direction, units));
        self.refresh().await
    }

    /// Set the brightness in percent. Values below 50 blank the display.
    ///
    /// # Errors
    ///
    /// Fails for values above 100, when not enabled or the device is not
    /// online.
    pub async fn set_brightness(&mut self, brightness: u8) -> Result<()> {
        self.session.ensure_enabled()?;
        if brightness > 100 {
            return Err(DriverError::invalid_argument(format!(
                "Brightness {} out of range",
                brightness
            )));
        }
        self.brightness = brightness;
        self.refresh().await
    }

    /// Select a character set and wait for the device to accept it.
    ///
    /// # Errors
    ///
    /// * [`DriverError::InvalidArgument`] for sets the display lacks
    /// * [`DriverError::NoResponse`] when the device rejects or does not
    ///   acknowledge the change
    pub async fn set_character_set(&mut self, character_set: u32) -> Result<()> {
        self.session.ensure_enabled()?;
        let command = Command::code_page(character_set)
            .map_err(|e| DriverError::invalid_argument(e.to_string()))?;
        let driver = self.session.driver();
        driver.execute(command).await?;
        if !driver.snapshot().code_page_accepted {
            return Err(DriverError::no_response(format!(
                "Character set {} rejected",
                character_set
            )));
        }
        self.character_set = character_set;
        Ok(())
    }

    /// Send both rows to the device.
    ///
    /// # Errors
    ///
    /// Fails when not enabled or the device is not online.
    pub async fn refresh(&self) -> Result<()> {
        self.session.ensure_enabled()?;
        let contents = self.contents();
        for row in 0..DISPLAY_ROWS {
            let line = if self.brightness < MIN_VISIBLE_BRIGHTNESS {
                " ".to_string()
            } else {
                contents.line(row)
            };
            self.session
                .driver()
                .execute(Command::display_line(row, line)?)
                .await?;
        }
        Ok(())
    }
}

impl Peripheral for LineDisplay {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
